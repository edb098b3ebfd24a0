use serde::{Deserialize, Serialize};

/// Run scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Streaming,
    AwaitingTools,
    Draining,
    Cancelling,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Streaming => "streaming",
            RunState::AwaitingTools => "awaiting_tools",
            RunState::Draining => "draining",
            RunState::Cancelling => "cancelling",
            RunState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A single event in a run's ordered stream.
/// `seq` is strictly monotonic per `run_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Started { run_id: String, seq: u64 },
    TextDelta { run_id: String, seq: u64, text: String },
    ToolCall { run_id: String, seq: u64, tool_call_id: String, name: String, arguments: serde_json::Value },
    ToolResult { run_id: String, seq: u64, tool_call_id: String, content: String, is_error: bool },
    /// Re-emitted sub-agent event, carrying the parent's tool_call_id.
    SubAgent { run_id: String, seq: u64, parent_tool_call_id: String, inner: Box<RunEvent> },
    Status { run_id: String, seq: u64, state: RunState, tokens_total: u64, cost_usd: String, near_limit: bool },
    Done { run_id: String, seq: u64 },
    Cancelled { run_id: String, seq: u64 },
    Failed { run_id: String, seq: u64, message: String },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::Started { run_id, .. }
            | RunEvent::TextDelta { run_id, .. }
            | RunEvent::ToolCall { run_id, .. }
            | RunEvent::ToolResult { run_id, .. }
            | RunEvent::SubAgent { run_id, .. }
            | RunEvent::Status { run_id, .. }
            | RunEvent::Done { run_id, .. }
            | RunEvent::Cancelled { run_id, .. }
            | RunEvent::Failed { run_id, .. } => run_id,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            RunEvent::Started { seq, .. }
            | RunEvent::TextDelta { seq, .. }
            | RunEvent::ToolCall { seq, .. }
            | RunEvent::ToolResult { seq, .. }
            | RunEvent::SubAgent { seq, .. }
            | RunEvent::Status { seq, .. }
            | RunEvent::Done { seq, .. }
            | RunEvent::Cancelled { seq, .. }
            | RunEvent::Failed { seq, .. } => *seq,
        }
    }
}
