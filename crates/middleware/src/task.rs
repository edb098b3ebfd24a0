//! `Task` middleware: the `task` tool launches a sub-agent run
//! and waits for its final result. The actual run loop lives in the
//! scheduler crate (which depends on this one), so spawning is behind a
//! trait the scheduler implements — this middleware only owns the tool
//! surface and event re-emission.

use async_trait::async_trait;
use serde::Deserialize;

use crate::chain::{Middleware, ToolCaller};
use crate::error::{MiddlewareError, Result};
use crate::types::{AgentContext, ToolCall, ToolResult, ToolSchema};

/// Implemented by the scheduler: runs a sub-agent to completion and returns
/// its final text output. `parent_tool_call_id` identifies the `task` call
/// the sub-run belongs to, so its events can be re-emitted into the
/// parent's stream.
#[async_trait]
pub trait SubAgentSpawner: Send + Sync {
    async fn spawn(
        &self,
        parent_thread_id: &str,
        parent_tool_call_id: &str,
        subagent_type: &str,
        prompt: &str,
    ) -> std::result::Result<String, String>;
}

pub struct TaskMiddleware {
    spawner: std::sync::Arc<dyn SubAgentSpawner>,
}

impl TaskMiddleware {
    pub fn new(spawner: std::sync::Arc<dyn SubAgentSpawner>) -> Self {
        Self { spawner }
    }
}

#[derive(Deserialize)]
struct TaskArgs {
    subagent_type: String,
    prompt: String,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl Middleware for TaskMiddleware {
    fn name(&self) -> &str {
        "task"
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "task".to_string(),
            description: "Delegate a self-contained piece of work to a sub-agent and wait for its result.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "subagent_type": {"type": "string"},
                    "prompt": {"type": "string"},
                    "description": {"type": "string"}
                },
                "required": ["subagent_type", "prompt"]
            }),
        }]
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        match call.name.as_str() {
            "task" => {
                let args: TaskArgs = serde_json::from_value(call.arguments.clone()).map_err(|e| {
                    MiddlewareError::invalid_input(e.to_string(), "pass {\"subagent_type\", \"prompt\"}")
                })?;
                tracing::info!(
                    thread_id = %ctx.thread_id,
                    subagent_type = %args.subagent_type,
                    description = args.description.as_deref().unwrap_or(""),
                    "spawning sub-agent"
                );
                match self.spawner.spawn(&ctx.thread_id, &call.id, &args.subagent_type, &args.prompt).await {
                    Ok(output) => Ok(ToolResult::ok(call.id, output)),
                    Err(reason) => Ok(ToolResult::error(call.id, format!("sub-agent failed: {reason}"))),
                }
            }
            other => next.call(ToolCall { name: other.to_string(), ..call }).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl ToolCaller for Unreachable {
        async fn call(&self, call: ToolCall) -> Result<ToolResult> {
            Err(MiddlewareError::UnknownTool(call.name))
        }
    }

    struct EchoSpawner;

    #[async_trait]
    impl SubAgentSpawner for EchoSpawner {
        async fn spawn(&self, _parent: &str, _call_id: &str, subagent_type: &str, prompt: &str) -> std::result::Result<String, String> {
            Ok(format!("[{subagent_type}] handled: {prompt}"))
        }
    }

    struct FailingSpawner;

    #[async_trait]
    impl SubAgentSpawner for FailingSpawner {
        async fn spawn(&self, _parent: &str, _call_id: &str, _subagent_type: &str, _prompt: &str) -> std::result::Result<String, String> {
            Err("no capacity".to_string())
        }
    }

    #[tokio::test]
    async fn task_tool_returns_spawner_output() {
        let mw = TaskMiddleware::new(Arc::new(EchoSpawner));
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall {
            id: "1".into(),
            name: "task".into(),
            arguments: serde_json::json!({"subagent_type": "researcher", "prompt": "find X"}),
        };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert_eq!(result.content, "[researcher] handled: find X");
    }

    #[tokio::test]
    async fn spawner_failure_surfaces_as_tool_error_not_propagated_error() {
        let mw = TaskMiddleware::new(Arc::new(FailingSpawner));
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall {
            id: "1".into(),
            name: "task".into(),
            arguments: serde_json::json!({"subagent_type": "researcher", "prompt": "find X"}),
        };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("no capacity"));
    }
}
