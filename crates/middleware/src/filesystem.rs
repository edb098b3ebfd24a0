use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::chain::{Middleware, ToolCaller};
use crate::error::{MiddlewareError, Result};
use crate::types::{AgentContext, ToolCall, ToolResult, ToolSchema};
use agentcore_sandbox::provider::Provider;
use agentcore_sandbox::SandboxManager;

/// Where file operations land: a fixed provider instance (tests, or a
/// single pre-created instance), or resolved per call through the
/// `SandboxManager` so each thread reaches its own lease's instance.
enum FsBackend {
    Fixed { provider: Arc<dyn Provider>, instance_id: String },
    Managed { manager: Arc<SandboxManager> },
}

/// Backs `read_file`/`write_file`/`edit_file`/`list_dir` onto either the
/// local filesystem or a sandbox provider's fs ops.
/// `agentcore_sandbox::Provider` already exposes
/// `read_file`/`write_file`/`list_dir`, so both the local and remote cases
/// go through the same trait object.
pub struct FileSystemMiddleware {
    backend: FsBackend,
    workspace_root: PathBuf,
    /// Paths outside `workspace_root` that are nonetheless permitted.
    whitelist: Vec<PathBuf>,
}

impl FileSystemMiddleware {
    pub fn new(provider: Arc<dyn Provider>, instance_id: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            backend: FsBackend::Fixed { provider, instance_id: instance_id.into() },
            workspace_root: workspace_root.into(),
            whitelist: Vec::new(),
        }
    }

    /// Resolve the thread's lease (creating session/terminal/lease on first
    /// use) for every call, so file ops always land on the live instance.
    pub fn via_manager(manager: Arc<SandboxManager>, workspace_root: impl Into<PathBuf>) -> Self {
        Self { backend: FsBackend::Managed { manager }, workspace_root: workspace_root.into(), whitelist: Vec::new() }
    }

    /// Paths outside `workspace_root` that reads may nonetheless touch.
    /// The whitelist never permits writes.
    pub fn with_whitelist(mut self, paths: Vec<PathBuf>) -> Self {
        self.whitelist = paths;
        self
    }

    async fn resolve(&self, thread_id: &str) -> Result<(Arc<dyn Provider>, String)> {
        match &self.backend {
            FsBackend::Fixed { provider, instance_id } => Ok((provider.clone(), instance_id.clone())),
            FsBackend::Managed { manager } => {
                let cap = manager.get_sandbox(thread_id, None).await?;
                let instance = cap.lease.ensure_active_instance().await?;
                Ok((cap.lease.provider.clone(), instance.instance_id))
            }
        }
    }

    /// Rejects relative paths, then enforces the workspace boundary. The
    /// whitelist exempts a path from the workspace-root check only for
    /// read-only operations — writes never leave `workspace_root`.
    fn validate_path(&self, raw: &str, read_only: bool) -> Result<PathBuf> {
        let path = Path::new(raw);
        if !path.is_absolute() {
            return Err(MiddlewareError::invalid_input(
                format!("path must be absolute, got {raw:?}"),
                format!("use an absolute path, e.g. {}", self.workspace_root.join(raw).display()),
            ));
        }
        let whitelisted = read_only && self.whitelist.iter().any(|w| path.starts_with(w));
        if path.starts_with(&self.workspace_root) || whitelisted {
            Ok(path.to_path_buf())
        } else {
            Err(MiddlewareError::PolicyDenied {
                reason: format!(
                    "{raw} is outside workspace_root {} and not whitelisted for this operation",
                    self.workspace_root.display()
                ),
            })
        }
    }
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct EditFileArgs {
    path: String,
    old_text: String,
    new_text: String,
}

#[derive(Deserialize)]
struct ListDirArgs {
    path: String,
}

#[async_trait]
impl Middleware for FileSystemMiddleware {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "read_file".to_string(),
                description: "Read the contents of a file at an absolute path.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}),
            },
            ToolSchema {
                name: "write_file".to_string(),
                description: "Write content to a file at an absolute path, creating or overwriting it.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{"path":{"type":"string"},"content":{"type":"string"}},"required":["path","content"]}),
            },
            ToolSchema {
                name: "edit_file".to_string(),
                description: "Replace the first occurrence of old_text with new_text in a file.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{"path":{"type":"string"},"old_text":{"type":"string"},"new_text":{"type":"string"}},"required":["path","old_text","new_text"]}),
            },
            ToolSchema {
                name: "list_dir".to_string(),
                description: "List entries of a directory at an absolute path.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}),
            },
        ]
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        match call.name.as_str() {
            "read_file" => {
                let args: ReadFileArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"path\": \"/abs/path\"}"))?;
                let path = self.validate_path(&args.path, true)?;
                let (provider, instance_id) = self.resolve(&ctx.thread_id).await?;
                let bytes = provider
                    .read_file(&instance_id, &path.to_string_lossy())
                    .await
                    .map_err(agentcore_sandbox::SandboxError::from)?;
                Ok(ToolResult::ok(call.id, String::from_utf8_lossy(&bytes).into_owned()))
            }
            "write_file" => {
                let args: WriteFileArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"path\": ..., \"content\": ...}"))?;
                let path = self.validate_path(&args.path, false)?;
                let (provider, instance_id) = self.resolve(&ctx.thread_id).await?;
                provider
                    .write_file(&instance_id, &path.to_string_lossy(), args.content.as_bytes())
                    .await
                    .map_err(agentcore_sandbox::SandboxError::from)?;
                Ok(ToolResult::ok(call.id, format!("wrote {} bytes to {}", args.content.len(), path.display())))
            }
            "edit_file" => {
                let args: EditFileArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"path\", \"old_text\", \"new_text\"}"))?;
                let path = self.validate_path(&args.path, false)?;
                let (provider, instance_id) = self.resolve(&ctx.thread_id).await?;
                let current_bytes = provider
                    .read_file(&instance_id, &path.to_string_lossy())
                    .await
                    .map_err(agentcore_sandbox::SandboxError::from)?;
                let current = String::from_utf8_lossy(&current_bytes).into_owned();
                if !current.contains(&args.old_text) {
                    return Ok(ToolResult::error(call.id, format!("old_text not found in {}", path.display())));
                }
                let updated = current.replacen(&args.old_text, &args.new_text, 1);
                provider
                    .write_file(&instance_id, &path.to_string_lossy(), updated.as_bytes())
                    .await
                    .map_err(agentcore_sandbox::SandboxError::from)?;
                Ok(ToolResult::ok(call.id, format!("edited {}", path.display())))
            }
            "list_dir" => {
                let args: ListDirArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"path\": \"/abs/path\"}"))?;
                let path = self.validate_path(&args.path, true)?;
                let (provider, instance_id) = self.resolve(&ctx.thread_id).await?;
                let entries = provider
                    .list_dir(&instance_id, &path.to_string_lossy())
                    .await
                    .map_err(agentcore_sandbox::SandboxError::from)?;
                Ok(ToolResult::ok(call.id, entries.join("\n")))
            }
            other => next.call(ToolCall { name: other.to_string(), ..call }).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_sandbox::mock_provider::MockProvider;

    struct Unreachable;

    #[async_trait]
    impl ToolCaller for Unreachable {
        async fn call(&self, call: ToolCall) -> Result<ToolResult> {
            Err(MiddlewareError::UnknownTool(call.name))
        }
    }

    fn middleware() -> FileSystemMiddleware {
        FileSystemMiddleware::new(Arc::new(MockProvider::new()), "inst-1", "/workspace")
    }

    #[tokio::test]
    async fn rejects_relative_path() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "read_file".into(), arguments: serde_json::json!({"path": "relative.txt"}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await;
        assert!(matches!(result, Err(MiddlewareError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn rejects_path_outside_workspace() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "read_file".into(), arguments: serde_json::json!({"path": "/etc/passwd"}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await;
        assert!(matches!(result, Err(MiddlewareError::PolicyDenied { .. })));
    }

    #[tokio::test]
    async fn whitelist_permits_reads_but_never_writes_outside_workspace() {
        let provider = Arc::new(MockProvider::new());
        provider.write_file("inst-1", "/shared/data.txt", b"shared").await.unwrap();
        let mw = FileSystemMiddleware::new(provider, "inst-1", "/workspace")
            .with_whitelist(vec![PathBuf::from("/shared")]);
        let ctx = AgentContext::new("t1", "r1");

        let read = ToolCall { id: "1".into(), name: "read_file".into(), arguments: serde_json::json!({"path": "/shared/data.txt"}) };
        let result = mw.wrap_tool_call(&ctx, read, &Unreachable).await.unwrap();
        assert_eq!(result.content, "shared");

        let write = ToolCall {
            id: "2".into(),
            name: "write_file".into(),
            arguments: serde_json::json!({"path": "/shared/data.txt", "content": "overwritten"}),
        };
        let result = mw.wrap_tool_call(&ctx, write, &Unreachable).await;
        assert!(matches!(result, Err(MiddlewareError::PolicyDenied { .. })));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_mock_provider() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let write = ToolCall {
            id: "1".into(),
            name: "write_file".into(),
            arguments: serde_json::json!({"path": "/workspace/a.txt", "content": "hello"}),
        };
        mw.wrap_tool_call(&ctx, write, &Unreachable).await.unwrap();

        let read = ToolCall { id: "2".into(), name: "read_file".into(), arguments: serde_json::json!({"path": "/workspace/a.txt"}) };
        let result = mw.wrap_tool_call(&ctx, read, &Unreachable).await.unwrap();
        assert_eq!(result.content, "hello");
    }

    #[tokio::test]
    async fn unrelated_tool_falls_through_to_next() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "run_command".into(), arguments: serde_json::json!({}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await;
        assert!(matches!(result, Err(MiddlewareError::UnknownTool(_))));
    }
}
