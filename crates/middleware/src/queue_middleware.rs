//! `Queue` middleware: observes `agentcore_queue::QueueManager`
//! and injects pending steer content as synthetic user messages immediately
//! before the next model call — the only call site allowed to drain at
//! `DrainPoint::SafePoint`. The steer marker itself is applied by the queue
//! manager on drain.

use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::{Middleware, ModelCaller};
use crate::error::Result;
use crate::types::{AgentContext, ChatMessage, ModelRequest, ModelResponse, Role};
use agentcore_queue::{DrainPoint, QueueManager};

pub struct QueueMiddleware {
    manager: Arc<QueueManager>,
}

impl QueueMiddleware {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Middleware for QueueMiddleware {
    fn name(&self) -> &str {
        "queue"
    }

    async fn wrap_model_call(&self, ctx: &AgentContext, mut request: ModelRequest, next: &dyn ModelCaller) -> Result<ModelResponse> {
        let injected = self.manager.drain_for_injection(&ctx.thread_id, DrainPoint::SafePoint);
        for message in injected {
            request.messages.push(ChatMessage::new(Role::User, message));
        }
        next.call(request).await
    }
}
