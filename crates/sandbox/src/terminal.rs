use std::sync::Arc;

use agentcore_store::types::AbstractTerminalRow;
use agentcore_store::Store;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;
use crate::types::TerminalState;

/// Durable terminal state keyed by thread.
///
/// `update_state` serializes concurrent callers on the same terminal under
/// a per-terminal async lock.
pub struct AbstractTerminal {
    pub terminal_id: String,
    pub thread_id: String,
    pub lease_id: String,
    store: Arc<Store>,
    locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AbstractTerminal {
    pub fn new(
        terminal_id: String,
        thread_id: String,
        lease_id: String,
        store: Arc<Store>,
        locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
    ) -> Self {
        Self { terminal_id, thread_id, lease_id, store, locks }
    }

    fn lock_handle(&self) -> Arc<AsyncMutex<()>> {
        self.locks.entry(self.terminal_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Return the current immutable snapshot.
    pub fn get_state(&self) -> Result<TerminalState> {
        let row = self
            .store
            .get_terminal_by_thread(&self.thread_id)?
            .expect("terminal row must exist once an AbstractTerminal handle has been constructed");
        Ok(serde_json::from_str(&row.state_json)?)
    }

    /// Persist `new_state` atomically, bumping `version` by one.
    pub async fn update_state(&self, mut new_state: TerminalState) -> Result<TerminalState> {
        let lock = self.lock_handle();
        let _guard = lock.lock().await;

        let row = self
            .store
            .get_terminal_by_thread(&self.thread_id)?
            .expect("terminal row must exist once an AbstractTerminal handle has been constructed");

        new_state.version = row.version;
        let state_json = serde_json::to_string(&new_state)?;
        let new_version = self.store.update_terminal_state(&self.terminal_id, &state_json, row.version)?;
        new_state.version = new_version;
        Ok(new_state)
    }
}

pub(crate) fn row_to_state(row: &AbstractTerminalRow) -> Result<TerminalState> {
    Ok(serde_json::from_str(&row.state_json)?)
}
