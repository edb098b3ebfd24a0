//! `Monitor` middleware: emits a status event after every model
//! response (token usage, cost, context pressure). The actual accounting
//! lives in `agentcore-observer`; this middleware only owns the emission
//! point in the onion, behind a sink trait so the dependency points the
//! right way (middleware does not depend on observer).

use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::{Middleware, ModelCaller};
use crate::error::Result;
use crate::types::{AgentContext, ModelRequest, ModelResponse, TokenUsage};

/// Implemented by `agentcore-observer`: records one model turn's usage and
/// decides whether/what status event to surface.
pub trait ObserverSink: Send + Sync {
    fn record_turn(&self, thread_id: &str, model: &str, usage: &TokenUsage, stop_reason: &str);
}

pub struct MonitorMiddleware {
    sink: Arc<dyn ObserverSink>,
}

impl MonitorMiddleware {
    pub fn new(sink: Arc<dyn ObserverSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for MonitorMiddleware {
    fn name(&self) -> &str {
        "monitor"
    }

    async fn wrap_model_call(&self, ctx: &AgentContext, request: ModelRequest, next: &dyn ModelCaller) -> Result<ModelResponse> {
        let model = request.model.clone();
        let response = next.call(request).await?;
        self.sink.record_turn(&ctx.thread_id, &model, &response.usage, &response.stop_reason);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MiddlewareStack;
    use crate::types::{ChatMessage, ModelToolCall, Role};
    use std::sync::Mutex;

    struct Echo;

    #[async_trait]
    impl ModelCaller for Echo {
        async fn call(&self, request: ModelRequest) -> Result<ModelResponse> {
            let _ = request;
            Ok(ModelResponse {
                content: "ok".to_string(),
                tool_calls: Vec::<ModelToolCall>::new(),
                usage: TokenUsage { input: 10, output: 5, reasoning: 0, cache_read: 0, cache_creation: 0 },
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, u64)>>,
    }

    impl ObserverSink for RecordingSink {
        fn record_turn(&self, thread_id: &str, _model: &str, usage: &TokenUsage, _stop_reason: &str) {
            self.calls.lock().unwrap().push((thread_id.to_string(), usage.total()));
        }
    }

    #[tokio::test]
    async fn records_one_turn_per_model_call() {
        let sink = Arc::new(RecordingSink::default());
        let mut stack = MiddlewareStack::new();
        stack.push(Arc::new(MonitorMiddleware::new(sink.clone())));
        let ctx = AgentContext::new("t1", "r1");
        let request = ModelRequest { model: "m".to_string(), messages: vec![ChatMessage::new(Role::User, "hi")], tools: vec![] };
        stack.run_model_call(&ctx, request, &Echo).await.unwrap();

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("t1".to_string(), 15));
    }
}
