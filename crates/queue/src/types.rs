use agentcore_core::types::QueueTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(content, target_queue, enqueued_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub seq: u64,
    pub content: String,
    pub target: QueueTarget,
    pub enqueued_at: DateTime<Utc>,
}

/// The point in the scheduler's state machine at which a drain is requested.
/// Determines which queues are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPoint {
    /// A message just arrived — `interrupt` always drains immediately
    /// regardless of drain point.
    Immediate,
    /// Between two LLM messages within the same run (never mid-stream).
    SafePoint,
    /// The run has just reached `draining`.
    RunDraining,
    /// An explicit client-triggered flush of `collect`/`backlog`.
    ExplicitFlush,
}
