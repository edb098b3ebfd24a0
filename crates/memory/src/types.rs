use serde::{Deserialize, Serialize};

/// Role of a single entry in a thread's conversation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// A tool result turn, eligible for structural pruning.
    Tool,
}

/// One entry in the live, in-memory conversation list that the scheduler
/// feeds to the LLM each turn. Distinct from `agentcore_store::RunEventRow`:
/// this is the rendered view, not the durable event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Set once a tool result has been trimmed or cleared by the pruner, so
    /// a second pruning pass over the same message is a no-op.
    #[serde(default)]
    pub pruned: bool,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), pruned: false }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self.role, MessageRole::Tool)
    }
}

/// Outcome of a single compaction pass, for observability/testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Estimated tokens stayed below the trigger; nothing was done.
    NotNeeded,
    /// `head` was summarized and replaced in-place; carries the slot
    /// index(es) the summary was persisted under.
    Compacted { slots: Vec<i64> },
    /// The summarizer call failed; the conversation is untouched.
    Aborted { reason: String },
}
