//! `Command` middleware: injects `run_command`/`command_status`, supports
//! blocking and non-blocking invocation, gates every command through the
//! `safety::HookChain`, and truncates captured output to its tail so a
//! runaway command can't flood the conversation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::chain::{Middleware, ToolCaller};
use crate::error::{MiddlewareError, Result};
use crate::safety::HookChain;
use crate::types::{AgentContext, ToolCall, ToolResult, ToolSchema};
use agentcore_sandbox::provider::Provider;
use agentcore_sandbox::types::ExecOutcome;
use agentcore_sandbox::SandboxManager;

/// Output beyond this many characters keeps only its tail, prefixed with a
/// `[truncated K lines]` annotation counting what was dropped.
const MAX_OUTPUT_CHARS: usize = 8_000;

/// Blocking calls wait at most this long before the command is backgrounded
/// and a `command_id` handed back for polling via `command_status`.
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(30);
const EXEC_TIMEOUT: Duration = Duration::from_secs(600);

pub fn truncate_output(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let mut boundary = text.len() - MAX_OUTPUT_CHARS;
    while !text.is_char_boundary(boundary) {
        boundary += 1;
    }
    let truncated_lines = text[..boundary].lines().count();
    format!("[truncated {truncated_lines} lines]\n{}", &text[boundary..])
}

#[derive(Clone)]
enum CommandState {
    Running,
    Done(ExecOutcome),
}

struct CommandHandle {
    state: CommandState,
    command: String,
}

/// Where commands execute: a fixed provider instance (tests, or a single
/// pre-created instance), or per-thread through the `SandboxManager` so
/// each command runs on the thread's own terminal — hydrating cwd/env and
/// persisting the resulting state back, the full L3→runtime→lease path.
#[derive(Clone)]
enum CommandBackend {
    Fixed { provider: Arc<dyn Provider>, instance_id: String, cwd: String },
    Managed { manager: Arc<SandboxManager> },
}

async fn exec_via(backend: CommandBackend, thread_id: &str, command: &str, timeout: Duration) -> Result<ExecOutcome> {
    match backend {
        CommandBackend::Fixed { provider, instance_id, cwd } => {
            let env = std::collections::HashMap::new();
            Ok(provider
                .exec(&instance_id, command, &cwd, &env, timeout)
                .await
                .map_err(agentcore_sandbox::SandboxError::from)?)
        }
        CommandBackend::Managed { manager } => {
            let mut cap = manager.get_sandbox(thread_id, None).await?;
            match cap.runtime.exec(command).await {
                Ok(outcome) => {
                    manager.touch(thread_id).await?;
                    Ok(outcome)
                }
                Err(e) => {
                    // A fatal provider failure invalidates the session and
                    // the lease's instance; the next tool call rebuilds both.
                    if e.kind() == agentcore_core::error::ErrorKind::ProviderFatal {
                        if let Err(cleanup) = manager.handle_provider_fatal(thread_id).await {
                            tracing::warn!(thread_id, error = %cleanup, "sandbox invalidation after provider failure also failed");
                        }
                    }
                    Err(e.into())
                }
            }
        }
    }
}

/// Injects `run_command`/`command_status`, dispatching through an
/// `agentcore_sandbox::Provider` and gating every command through a
/// pre-execution `HookChain`.
pub struct CommandMiddleware {
    backend: CommandBackend,
    hooks: HookChain,
    commands: Arc<DashMap<String, CommandHandle>>,
}

impl CommandMiddleware {
    pub fn new(provider: Arc<dyn Provider>, instance_id: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            backend: CommandBackend::Fixed { provider, instance_id: instance_id.into(), cwd: cwd.into() },
            hooks: HookChain::default(),
            commands: Arc::new(DashMap::new()),
        }
    }

    /// Execute through each thread's own `PhysicalTerminalRuntime`, so cwd
    /// and env changes persist across commands and process restarts.
    pub fn via_manager(manager: Arc<SandboxManager>) -> Self {
        Self {
            backend: CommandBackend::Managed { manager },
            hooks: HookChain::default(),
            commands: Arc::new(DashMap::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    async fn run_command(&self, thread_id: &str, args: RunCommandArgs) -> Result<ToolResult> {
        if let Some(reason) = self.hooks.check(&args.command) {
            return Ok(ToolResult::error(String::new(), format!("command blocked: {reason}")));
        }

        let command_id = Uuid::new_v4().to_string();

        if args.blocking {
            let outcome = exec_via(self.backend.clone(), thread_id, &args.command, BLOCKING_TIMEOUT).await?;
            self.commands
                .insert(command_id.clone(), CommandHandle { state: CommandState::Done(outcome.clone()), command: args.command });
            return Ok(format_outcome(&command_id, &outcome));
        }

        // Non-blocking: hand back the command_id immediately and finish the
        // exec on its own task; command_status polls the handle.
        self.commands
            .insert(command_id.clone(), CommandHandle { state: CommandState::Running, command: args.command.clone() });
        let commands = Arc::clone(&self.commands);
        let backend = self.backend.clone();
        let thread_id = thread_id.to_string();
        let id_for_task = command_id.clone();
        tokio::spawn(async move {
            let outcome = match exec_via(backend, &thread_id, &args.command, EXEC_TIMEOUT).await {
                Ok(outcome) => outcome,
                Err(e) => ExecOutcome { exit_code: -1, stdout: String::new(), stderr: e.to_string() },
            };
            if let Some(mut handle) = commands.get_mut(&id_for_task) {
                handle.state = CommandState::Done(outcome);
            }
        });

        Ok(ToolResult::ok(String::new(), format!("command_id: {command_id}\nstatus: running")))
    }

    fn command_status(&self, command_id: &str) -> Result<ToolResult> {
        match self.commands.get(command_id) {
            Some(handle) => match &handle.state {
                CommandState::Running => Ok(ToolResult::ok(
                    String::new(),
                    format!("command_id: {command_id}\nstatus: running\ncommand: {}", handle.command),
                )),
                CommandState::Done(outcome) => Ok(format_outcome(command_id, outcome)),
            },
            None => Ok(ToolResult::error(String::new(), format!("no such command_id: {command_id}"))),
        }
    }
}

fn format_outcome(command_id: &str, outcome: &ExecOutcome) -> ToolResult {
    let stdout = truncate_output(&outcome.stdout);
    let stderr = truncate_output(&outcome.stderr);
    let content = format!(
        "command_id: {command_id}\nstatus: done\nexit_code: {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
        outcome.exit_code
    );
    if outcome.exit_code == 0 {
        ToolResult::ok(String::new(), content)
    } else {
        ToolResult::error(String::new(), content)
    }
}

#[derive(Deserialize)]
struct RunCommandArgs {
    command: String,
    #[serde(default)]
    blocking: bool,
}

#[derive(Deserialize)]
struct CommandStatusArgs {
    command_id: String,
}

#[async_trait]
impl Middleware for CommandMiddleware {
    fn name(&self) -> &str {
        "command"
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "run_command".to_string(),
                description: "Run a shell command. Set blocking=true to wait for completion (default), false to return a command_id immediately for polling with command_status.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"command": {"type": "string"}, "blocking": {"type": "boolean"}},
                    "required": ["command"]
                }),
            },
            ToolSchema {
                name: "command_status".to_string(),
                description: "Poll the status and truncated output of a command started with run_command(blocking=false).".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"command_id": {"type": "string"}},
                    "required": ["command_id"]
                }),
            },
        ]
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        match call.name.as_str() {
            "run_command" => {
                let args: RunCommandArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"command\": \"...\"}"))?;
                let mut result = self.run_command(&ctx.thread_id, args).await?;
                result.id = call.id;
                Ok(result)
            }
            "command_status" => {
                let args: CommandStatusArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"command_id\": \"...\"}"))?;
                let mut result = self.command_status(&args.command_id)?;
                result.id = call.id;
                Ok(result)
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

    fn middleware() -> CommandMiddleware {
        CommandMiddleware::new(Arc::new(MockProvider::new()), "inst-1", "/workspace")
    }

    #[tokio::test]
    async fn blocking_command_runs_and_returns_output() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "run_command".into(), arguments: serde_json::json!({"command": "echo hi", "blocking": true}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("echo hi"));
    }

    #[tokio::test]
    async fn dangerous_command_is_blocked_before_exec() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "run_command".into(), arguments: serde_json::json!({"command": "sudo rm -rf /", "blocking": true}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("blocked"));
    }

    #[tokio::test]
    async fn non_blocking_command_returns_id_immediately_and_finishes() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "run_command".into(), arguments: serde_json::json!({"command": "ls", "blocking": false}) };
        let started = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(started.content.contains("status: running"));
        let command_id = started.content.lines().next().unwrap().trim_start_matches("command_id: ").to_string();

        let mut status = String::new();
        for _ in 0..100 {
            let poll = ToolCall { id: "2".into(), name: "command_status".into(), arguments: serde_json::json!({"command_id": command_id}) };
            status = mw.wrap_tool_call(&ctx, poll, &Unreachable).await.unwrap().content;
            if status.contains("status: done") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(status.contains("status: done"));
    }

    #[tokio::test]
    async fn managed_backend_runs_through_the_thread_terminal() {
        let store = Arc::new(agentcore_store::Store::open_in_memory().unwrap());
        let mut manager = SandboxManager::new(store, "mock".to_string(), Duration::from_secs(5));
        let provider = Arc::new(MockProvider::new());
        manager.register_provider(provider.clone());
        let manager = Arc::new(manager);

        let mw = CommandMiddleware::via_manager(manager.clone());
        let ctx = AgentContext::new("t-managed", "r1");
        let call = ToolCall {
            id: "1".into(),
            name: "run_command".into(),
            arguments: serde_json::json!({"command": "echo managed", "blocking": true}),
        };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(result.content.contains("echo managed"));
        assert_eq!(provider.exec_log().len(), 1);

        // the exec round-trip persisted terminal state through the runtime
        let cap = manager.get_sandbox("t-managed", None).await.unwrap();
        assert!(cap.terminal.get_state().unwrap().version >= 1);
    }

    #[tokio::test]
    async fn unknown_command_id_is_reported_as_error() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "command_status".into(), arguments: serde_json::json!({"command_id": "nonexistent"}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn truncate_keeps_only_the_tail_of_long_output() {
        let long: String = (0..2_000).map(|i| format!("line {i}\n")).collect();
        let out = truncate_output(&long);
        assert!(out.len() < long.len());
        assert!(out.starts_with("[truncated "));
        assert!(out.contains(" lines]\n"));
        assert!(out.ends_with("line 1999\n"));
    }

    #[test]
    fn truncate_is_noop_for_short_output() {
        assert_eq!(truncate_output("short"), "short");
    }
}
