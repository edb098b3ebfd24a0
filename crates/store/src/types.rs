use serde::{Deserialize, Serialize};

/// Durable conversation identity. `preview` holds an
/// excerpt of the first user message, set once and never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRow {
    pub thread_id: String,
    pub created_at: String,
    pub preview: String,
}

/// One persisted conversation turn, in insertion order per thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessageRow {
    pub thread_id: String,
    pub idx: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Raw persisted row for a `ChatSession`. The `policy_json`/`status` fields
/// are opaque to this crate — `agentcore-sandbox` owns their meaning and
/// (de)serializes them at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionRow {
    pub session_id: String,
    pub thread_id: String,
    pub terminal_id: String,
    pub status: String,
    pub created_at: String,
    pub last_active_at: String,
    pub policy_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbstractTerminalRow {
    pub terminal_id: String,
    pub thread_id: String,
    pub lease_id: String,
    pub state_json: String,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLeaseRow {
    pub lease_id: String,
    pub provider_name: String,
    pub instance_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub thread_id: String,
    pub slot_index: i64,
    pub content: String,
    pub token_count: i64,
    pub message_count_at_compaction: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEventRow {
    pub run_id: String,
    pub seq: i64,
    pub event_type: String,
    pub data_json: String,
    pub created_at: String,
}
