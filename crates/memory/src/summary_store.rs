use std::sync::Arc;

use agentcore_store::Store;
use chrono::Utc;
use tracing::instrument;

use crate::error::Result;
use crate::types::{Message, MessageRole};

/// Durable, append-only record of compaction summaries for a thread.
///
/// Thin wrapper over `agentcore_store::Store`'s `summaries` table —
/// persistence concerns stay in `agentcore-store`, this type only adds the
/// domain-shaped `append`/`rebuild_conversation` contract.
pub struct SummaryStore {
    store: Arc<Store>,
}

impl SummaryStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, content))]
    pub fn append(
        &self,
        thread_id: &str,
        content: &str,
        token_count: u64,
        message_count_at_compaction: u64,
    ) -> Result<i64> {
        let slot = self.store.append_summary(
            thread_id,
            content,
            token_count as i64,
            message_count_at_compaction as i64,
            &Utc::now().to_rfc3339(),
        )?;
        Ok(slot)
    }

    pub fn load_all(&self, thread_id: &str) -> Result<Vec<agentcore_store::types::SummaryRow>> {
        Ok(self.store.load_all_summaries(thread_id)?)
    }

    /// Reconstructs the summarized conversation view: one synthetic system
    /// message per persisted summary slot (in slot order), followed by
    /// `tail` — the live messages that survived the most recent compaction.
    pub fn rebuild_conversation(&self, thread_id: &str, tail: &[Message]) -> Result<Vec<Message>> {
        let summaries = self.load_all(thread_id)?;
        let mut out: Vec<Message> = summaries
            .into_iter()
            .map(|row| Message::new(MessageRole::System, format!("[summary #{}] {}", row.slot_index, row.content)))
            .collect();
        out.extend(tail.iter().cloned());
        Ok(out)
    }
}
