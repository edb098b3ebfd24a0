//! `Memory` middleware: orchestrates structural pruning
//! and LLM-driven compaction of each thread's conversation before it goes
//! out to the model. Owns the canonical per-thread message list — other
//! middlewares see the request only after this one has rewritten it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::chain::{Middleware, ModelCaller};
use crate::error::{MiddlewareError, Result};
use crate::types::{AgentContext, ChatMessage, ModelRequest, ModelResponse, Role};
use agentcore_core::config::PruningConfig;
use agentcore_memory::{prune_messages, Compactor, Message, MessageRole};

fn to_memory_role(role: Role) -> MessageRole {
    match role {
        Role::System => MessageRole::System,
        Role::User => MessageRole::User,
        Role::Assistant => MessageRole::Assistant,
        Role::Tool => MessageRole::Tool,
    }
}

fn to_chat_role(role: MessageRole) -> Role {
    match role {
        MessageRole::System => Role::System,
        MessageRole::User => Role::User,
        MessageRole::Assistant => Role::Assistant,
        MessageRole::Tool => Role::Tool,
    }
}

pub struct MemoryMiddleware {
    pruning: PruningConfig,
    compactor: Compactor,
    context_limit: u64,
    conversations: DashMap<String, Arc<Mutex<Vec<Message>>>>,
}

impl MemoryMiddleware {
    pub fn new(pruning: PruningConfig, compactor: Compactor, context_limit: u64) -> Self {
        Self { pruning, compactor, context_limit, conversations: DashMap::new() }
    }

    fn conversation_for(&self, thread_id: &str) -> Arc<Mutex<Vec<Message>>> {
        self.conversations.entry(thread_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(Vec::new()))).clone()
    }
}

#[async_trait]
impl Middleware for MemoryMiddleware {
    fn name(&self) -> &str {
        "memory"
    }

    async fn wrap_model_call(&self, ctx: &AgentContext, request: ModelRequest, next: &dyn ModelCaller) -> Result<ModelResponse> {
        let conversation = self.conversation_for(&ctx.thread_id);
        let mut messages = conversation.lock().await;

        // System messages are per-call scaffolding (skill fragments, queue
        // notes) rebuilt by their middlewares every turn — they pass through
        // to the request below but are never recorded, or they'd duplicate
        // on every iteration of the tool loop.
        let mut system: Vec<ChatMessage> = Vec::new();
        for m in &request.messages {
            if m.role == Role::System {
                system.push(m.clone());
            } else {
                messages.push(Message::new(to_memory_role(m.role), m.content.clone()));
            }
        }

        prune_messages(&mut messages, &self.pruning);
        let outcome = self
            .compactor
            .compact_if_needed(&ctx.thread_id, &mut messages, &request.model, self.context_limit)
            .await
            .map_err(MiddlewareError::from)?;
        if let agentcore_memory::CompactionOutcome::Aborted { reason } = &outcome {
            // The conversation is left intact; the turn proceeds over the
            // unreduced context and compaction retries next turn.
            tracing::warn!(thread_id = %ctx.thread_id, reason, "compaction aborted");
        }

        let mut out_messages = system;
        out_messages.extend(messages.iter().map(|m| ChatMessage::new(to_chat_role(m.role), m.content.clone())));
        let rewritten = ModelRequest { model: request.model, messages: out_messages, tools: request.tools };
        drop(messages);

        let response = next.call(rewritten).await?;

        let mut messages = conversation.lock().await;
        messages.push(Message::new(MessageRole::Assistant, response.content.clone()));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MiddlewareStack;
    use crate::types::{ModelToolCall, TokenUsage};
    use agentcore_core::config::CompactionConfig;
    use agentcore_memory::{EchoSummarizer, SummaryStore};
    use agentcore_store::Store;

    struct Echo;

    #[async_trait]
    impl ModelCaller for Echo {
        async fn call(&self, request: ModelRequest) -> Result<ModelResponse> {
            Ok(ModelResponse {
                content: format!("saw {} messages", request.messages.len()),
                tool_calls: Vec::<ModelToolCall>::new(),
                usage: TokenUsage::default(),
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    async fn middleware() -> MemoryMiddleware {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let compactor = Compactor::new(
            CompactionConfig { reserve_tokens: 50, summary_model: None, split_turn_chars: 4000 },
            SummaryStore::new(store),
            Arc::new(EchoSummarizer),
        );
        MemoryMiddleware::new(
            PruningConfig { soft_trim_chars: 2000, hard_clear_threshold: 8000, protect_recent_turns: 2 },
            compactor,
            1_000_000,
        )
    }

    #[tokio::test]
    async fn appends_turns_into_the_per_thread_conversation() {
        let mw = middleware().await;
        let mut stack = MiddlewareStack::new();
        stack.push(Arc::new(mw));
        let ctx = AgentContext::new("t1", "r1");
        let request = ModelRequest { model: "m".to_string(), messages: vec![ChatMessage::new(Role::User, "hi")], tools: vec![] };
        let response = stack.run_model_call(&ctx, request, &Echo).await.unwrap();
        assert_eq!(response.content, "saw 1 messages");

        let request2 = ModelRequest { model: "m".to_string(), messages: vec![ChatMessage::new(Role::User, "again")], tools: vec![] };
        let response2 = stack.run_model_call(&ctx, request2, &Echo).await.unwrap();
        // prior user turn + prior assistant reply + this turn's user message
        assert_eq!(response2.content, "saw 3 messages");
    }
}
