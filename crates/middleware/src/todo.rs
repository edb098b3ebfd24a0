//! `Todo` middleware: stateful `todo_read`/`todo_write`, no I/O.
//! Keeps the agent's in-flight task list per thread so it survives across
//! model turns within a run without touching the store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::chain::{Middleware, ToolCaller};
use crate::error::{MiddlewareError, Result};
use crate::types::{AgentContext, ToolCall, ToolResult, ToolSchema};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

pub struct TodoMiddleware {
    lists: DashMap<String, Vec<TodoItem>>,
}

impl TodoMiddleware {
    pub fn new() -> Self {
        Self { lists: DashMap::new() }
    }
}

impl Default for TodoMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct TodoWriteArgs {
    todos: Vec<TodoItem>,
}

#[async_trait]
impl Middleware for TodoMiddleware {
    fn name(&self) -> &str {
        "todo"
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "todo_read".to_string(),
                description: "Read the current todo list for this thread.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{}}),
            },
            ToolSchema {
                name: "todo_write".to_string(),
                description: "Replace the todo list for this thread with a new one.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "todos": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "content": {"type": "string"},
                                    "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                                },
                                "required": ["content", "status"]
                            }
                        }
                    },
                    "required": ["todos"]
                }),
            },
        ]
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        match call.name.as_str() {
            "todo_read" => {
                let todos = self.lists.get(&ctx.thread_id).map(|l| l.clone()).unwrap_or_default();
                let content = serde_json::to_string(&todos).unwrap_or_else(|_| "[]".to_string());
                Ok(ToolResult::ok(call.id, content))
            }
            "todo_write" => {
                let args: TodoWriteArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"todos\": [...]}"))?;
                let count = args.todos.len();
                self.lists.insert(ctx.thread_id.clone(), args.todos);
                Ok(ToolResult::ok(call.id, format!("saved {count} todos")))
            }
            other => next.call(ToolCall { name: other.to_string(), ..call }).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl ToolCaller for Unreachable {
        async fn call(&self, call: ToolCall) -> Result<ToolResult> {
            Err(MiddlewareError::UnknownTool(call.name))
        }
    }

    #[tokio::test]
    async fn read_before_any_write_returns_empty_list() {
        let mw = TodoMiddleware::new();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "todo_read".into(), arguments: serde_json::json!({}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert_eq!(result.content, "[]");
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let mw = TodoMiddleware::new();
        let ctx = AgentContext::new("t1", "r1");
        let write = ToolCall {
            id: "1".into(),
            name: "todo_write".into(),
            arguments: serde_json::json!({"todos": [{"content": "write tests", "status": "in_progress"}]}),
        };
        mw.wrap_tool_call(&ctx, write, &Unreachable).await.unwrap();

        let read = ToolCall { id: "2".into(), name: "todo_read".into(), arguments: serde_json::json!({}) };
        let result = mw.wrap_tool_call(&ctx, read, &Unreachable).await.unwrap();
        assert!(result.content.contains("write tests"));
        assert!(result.content.contains("in_progress"));
    }

    #[tokio::test]
    async fn lists_are_isolated_per_thread() {
        let mw = TodoMiddleware::new();
        let ctx_a = AgentContext::new("a", "r1");
        let ctx_b = AgentContext::new("b", "r1");
        let write = ToolCall {
            id: "1".into(),
            name: "todo_write".into(),
            arguments: serde_json::json!({"todos": [{"content": "only for a", "status": "pending"}]}),
        };
        mw.wrap_tool_call(&ctx_a, write, &Unreachable).await.unwrap();

        let read_b = ToolCall { id: "2".into(), name: "todo_read".into(), arguments: serde_json::json!({}) };
        let result = mw.wrap_tool_call(&ctx_b, read_b, &Unreachable).await.unwrap();
        assert_eq!(result.content, "[]");
    }
}
