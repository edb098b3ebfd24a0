use async_trait::async_trait;

use crate::chain::{Middleware, ModelCaller};
use crate::error::Result;
use crate::types::{AgentContext, ModelRequest, ModelResponse, Role};

/// Marks Anthropic prompt-cache breakpoints on the first two system messages
/// and last two conversational (user/assistant) messages of the outbound
/// request. No-op for any other model family.
///
/// Breakpoint selection uses stable positional indices, never content
/// hashes — re-marking the same four slots every turn is what makes the
/// cache actually hit.
pub struct PromptCachingMiddleware;

fn is_anthropic_family(model: &str) -> bool {
    model.contains("claude")
}

#[async_trait]
impl Middleware for PromptCachingMiddleware {
    fn name(&self) -> &str {
        "prompt_caching"
    }

    async fn wrap_model_call(&self, ctx: &AgentContext, mut request: ModelRequest, next: &dyn ModelCaller) -> Result<ModelResponse> {
        let _ = ctx;
        if is_anthropic_family(&request.model) {
            mark_breakpoints(&mut request);
        }
        next.call(request).await
    }
}

fn mark_breakpoints(request: &mut ModelRequest) {
    let system_indices: Vec<usize> =
        request.messages.iter().enumerate().filter(|(_, m)| m.role == Role::System).map(|(i, _)| i).take(2).collect();

    let conversational_indices: Vec<usize> = request
        .messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role != Role::System)
        .map(|(i, _)| i)
        .rev()
        .take(2)
        .collect();

    for idx in system_indices.into_iter().chain(conversational_indices) {
        request.messages[idx].cache_control = true;
    }
}
