use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{Result, StoreError};
use crate::types::{
    AbstractTerminalRow, ChatSessionRow, RunEventRow, SandboxLeaseRow, SummaryRow, ThreadMessageRow, ThreadRow,
};

/// Durable store for the sandbox/memory/scheduler entities.
///
/// Wraps a single SQLite connection in a `Mutex` — sufficient for a
/// single-node deployment; a connection pool would be needed for higher
/// concurrency.
pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    /// Wrap an already-open (and schema-initialized) connection.
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Open a database file at `path`, creating schema if needed.
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(crate::schema::open(path)?))
    }

    /// Open a private in-memory database — used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        crate::schema::init_db(&conn)?;
        Ok(Self::new(conn))
    }

    // -- threads --------------------------------------------------------

    #[instrument(skip(self))]
    pub fn create_thread(&self, thread_id: &str, created_at: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO threads (thread_id, created_at, preview) VALUES (?1, ?2, '')",
            params![thread_id, created_at],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_thread(&self, thread_id: &str) -> Result<Option<ThreadRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT thread_id, created_at, preview FROM threads WHERE thread_id = ?1",
            params![thread_id],
            row_to_thread,
        )
        .optional()
        .map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    pub fn list_threads(&self) -> Result<Vec<ThreadRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT thread_id, created_at, preview FROM threads ORDER BY thread_id DESC")?;
        let rows = stmt.query_map([], row_to_thread)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Set the thread's preview excerpt if it hasn't been set yet. The
    /// first user message wins; later calls are no-ops.
    #[instrument(skip(self, preview))]
    pub fn set_thread_preview_if_empty(&self, thread_id: &str, preview: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE threads SET preview = ?1 WHERE thread_id = ?2 AND preview = ''",
            params![preview, thread_id],
        )?;
        Ok(())
    }

    /// Append a conversation turn at the next index for `thread_id`.
    #[instrument(skip(self, content))]
    pub fn append_thread_message(&self, thread_id: &str, role: &str, content: &str, created_at: &str) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let next_idx: i64 = db.query_row(
            "SELECT COALESCE(MAX(idx) + 1, 0) FROM thread_messages WHERE thread_id = ?1",
            params![thread_id],
            |r| r.get(0),
        )?;
        db.execute(
            "INSERT INTO thread_messages (thread_id, idx, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![thread_id, next_idx, role, content, created_at],
        )?;
        Ok(next_idx)
    }

    #[instrument(skip(self))]
    pub fn load_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessageRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT thread_id, idx, role, content, created_at
             FROM thread_messages WHERE thread_id = ?1 ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map(params![thread_id], row_to_thread_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    // -- chat_sessions --------------------------------------------------

    #[instrument(skip(self, row), fields(thread_id = %row.thread_id))]
    pub fn upsert_chat_session(&self, row: &ChatSessionRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chat_sessions
               (session_id, thread_id, terminal_id, status, created_at, last_active_at, policy_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(thread_id) DO UPDATE SET
               session_id = excluded.session_id,
               terminal_id = excluded.terminal_id,
               status = excluded.status,
               created_at = excluded.created_at,
               last_active_at = excluded.last_active_at,
               policy_json = excluded.policy_json",
            params![
                row.session_id,
                row.thread_id,
                row.terminal_id,
                row.status,
                row.created_at,
                row.last_active_at,
                row.policy_json,
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_chat_session_by_thread(&self, thread_id: &str) -> Result<Option<ChatSessionRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT session_id, thread_id, terminal_id, status, created_at, last_active_at, policy_json
             FROM chat_sessions WHERE thread_id = ?1",
            params![thread_id],
            row_to_chat_session,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// All known threads, newest-active first — backs `GET /api/threads`.
    #[instrument(skip(self))]
    pub fn list_chat_sessions(&self) -> Result<Vec<ChatSessionRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, thread_id, terminal_id, status, created_at, last_active_at, policy_json
             FROM chat_sessions ORDER BY last_active_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_chat_session)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    pub fn update_chat_session_status(&self, thread_id: &str, status: &str, last_active_at: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE chat_sessions SET status = ?1, last_active_at = ?2 WHERE thread_id = ?3",
            params![status, last_active_at, thread_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound { what: format!("chat_session(thread_id={thread_id})") });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn touch_chat_session(&self, thread_id: &str, last_active_at: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE chat_sessions SET last_active_at = ?1 WHERE thread_id = ?2",
            params![last_active_at, thread_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound { what: format!("chat_session(thread_id={thread_id})") });
        }
        Ok(())
    }

    /// Removes every row this crate owns for `thread_id` — backs
    /// `DELETE /api/threads/{id}`. The lease row is left in place:
    /// destroying a thread's session does not collapse a lease that other
    /// sessions may still reference.
    #[instrument(skip(self))]
    pub fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM chat_sessions WHERE thread_id = ?1", params![thread_id])?;
        db.execute("DELETE FROM abstract_terminals WHERE thread_id = ?1", params![thread_id])?;
        db.execute("DELETE FROM summaries WHERE thread_id = ?1", params![thread_id])?;
        db.execute("DELETE FROM thread_messages WHERE thread_id = ?1", params![thread_id])?;
        db.execute("DELETE FROM threads WHERE thread_id = ?1", params![thread_id])?;
        Ok(())
    }

    // -- abstract_terminals -----------------------------------------------

    #[instrument(skip(self, row), fields(thread_id = %row.thread_id))]
    pub fn upsert_terminal(&self, row: &AbstractTerminalRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO abstract_terminals (terminal_id, thread_id, lease_id, state_json, version)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(thread_id) DO UPDATE SET
               lease_id = excluded.lease_id,
               state_json = excluded.state_json,
               version = excluded.version",
            params![row.terminal_id, row.thread_id, row.lease_id, row.state_json, row.version],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_terminal_by_thread(&self, thread_id: &str) -> Result<Option<AbstractTerminalRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT terminal_id, thread_id, lease_id, state_json, version
             FROM abstract_terminals WHERE thread_id = ?1",
            params![thread_id],
            row_to_terminal,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Persist a new `state_json`, bumping `version` from `expected_version`
    /// to `expected_version + 1`. Fails with `VersionConflict` if the stored
    /// version has moved on — callers serialize under a per-terminal lock
    /// upstream, so this is a belt-and-braces check, not the primary guard.
    #[instrument(skip(self, state_json))]
    pub fn update_terminal_state(
        &self,
        terminal_id: &str,
        state_json: &str,
        expected_version: i64,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let new_version = expected_version + 1;
        let rows = db.execute(
            "UPDATE abstract_terminals SET state_json = ?1, version = ?2
             WHERE terminal_id = ?3 AND version = ?4",
            params![state_json, new_version, terminal_id, expected_version],
        )?;
        if rows == 0 {
            let found: i64 = db
                .query_row(
                    "SELECT version FROM abstract_terminals WHERE terminal_id = ?1",
                    params![terminal_id],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound { what: format!("terminal({terminal_id})") })?;
            return Err(StoreError::VersionConflict {
                what: format!("terminal({terminal_id})"),
                expected: expected_version,
                found,
            });
        }
        Ok(new_version)
    }

    // -- sandbox_leases -----------------------------------------------------

    #[instrument(skip(self, row), fields(lease_id = %row.lease_id))]
    pub fn upsert_lease(&self, row: &SandboxLeaseRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sandbox_leases (lease_id, provider_name, instance_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(lease_id) DO UPDATE SET
               provider_name = excluded.provider_name,
               instance_json = excluded.instance_json",
            params![row.lease_id, row.provider_name, row.instance_json],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_lease(&self, lease_id: &str) -> Result<Option<SandboxLeaseRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT lease_id, provider_name, instance_json FROM sandbox_leases WHERE lease_id = ?1",
            params![lease_id],
            row_to_lease,
        )
        .optional()
        .map_err(StoreError::from)
    }

    #[instrument(skip(self, instance_json))]
    pub fn update_lease_instance(&self, lease_id: &str, instance_json: Option<&str>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE sandbox_leases SET instance_json = ?1 WHERE lease_id = ?2",
            params![instance_json, lease_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound { what: format!("lease({lease_id})") });
        }
        Ok(())
    }

    // -- summaries ------------------------------------------------------

    /// Append a summary at the next `slot_index` for `thread_id` (1 + the
    /// current max, or 0 if none exist). Returns the assigned slot index.
    #[instrument(skip(self, content))]
    pub fn append_summary(
        &self,
        thread_id: &str,
        content: &str,
        token_count: i64,
        message_count_at_compaction: i64,
        created_at: &str,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let next_slot: i64 = db
            .query_row(
                "SELECT COALESCE(MAX(slot_index) + 1, 0) FROM summaries WHERE thread_id = ?1",
                params![thread_id],
                |r| r.get(0),
            )?;
        db.execute(
            "INSERT INTO summaries (thread_id, slot_index, content, token_count, message_count_at_compaction, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![thread_id, next_slot, content, token_count, message_count_at_compaction, created_at],
        )?;
        Ok(next_slot)
    }

    #[instrument(skip(self))]
    pub fn load_all_summaries(&self, thread_id: &str) -> Result<Vec<SummaryRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT thread_id, slot_index, content, token_count, message_count_at_compaction, created_at
             FROM summaries WHERE thread_id = ?1 ORDER BY slot_index ASC",
        )?;
        let rows = stmt.query_map(params![thread_id], row_to_summary)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // -- run_events -------------------------------------------------------

    #[instrument(skip(self, data_json))]
    pub fn append_run_event(&self, run_id: &str, seq: i64, event_type: &str, data_json: &str, created_at: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO run_events (run_id, seq, event_type, data_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, seq, event_type, data_json, created_at],
        )?;
        Ok(())
    }

    /// Replay events with `seq > after`, in order — backs
    /// `GET /runs/stream?after=<seq>`.
    #[instrument(skip(self))]
    pub fn load_run_events_after(&self, run_id: &str, after: i64) -> Result<Vec<RunEventRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT run_id, seq, event_type, data_json, created_at
             FROM run_events WHERE run_id = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![run_id, after], row_to_run_event)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow { thread_id: row.get(0)?, created_at: row.get(1)?, preview: row.get(2)? })
}

fn row_to_thread_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadMessageRow> {
    Ok(ThreadMessageRow {
        thread_id: row.get(0)?,
        idx: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_chat_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSessionRow> {
    Ok(ChatSessionRow {
        session_id: row.get(0)?,
        thread_id: row.get(1)?,
        terminal_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        last_active_at: row.get(5)?,
        policy_json: row.get(6)?,
    })
}

fn row_to_terminal(row: &rusqlite::Row<'_>) -> rusqlite::Result<AbstractTerminalRow> {
    Ok(AbstractTerminalRow {
        terminal_id: row.get(0)?,
        thread_id: row.get(1)?,
        lease_id: row.get(2)?,
        state_json: row.get(3)?,
        version: row.get(4)?,
    })
}

fn row_to_lease(row: &rusqlite::Row<'_>) -> rusqlite::Result<SandboxLeaseRow> {
    Ok(SandboxLeaseRow {
        lease_id: row.get(0)?,
        provider_name: row.get(1)?,
        instance_json: row.get(2)?,
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        thread_id: row.get(0)?,
        slot_index: row.get(1)?,
        content: row.get(2)?,
        token_count: row.get(3)?,
        message_count_at_compaction: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_run_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunEventRow> {
    Ok(RunEventRow {
        run_id: row.get(0)?,
        seq: row.get(1)?,
        event_type: row.get(2)?,
        data_json: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session(thread_id: &str) -> ChatSessionRow {
        ChatSessionRow {
            session_id: format!("sess-{thread_id}"),
            thread_id: thread_id.to_string(),
            terminal_id: format!("term-{thread_id}"),
            status: "active".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_active_at: "2026-01-01T00:00:00Z".to_string(),
            policy_json: "{}".to_string(),
        }
    }

    #[test]
    fn upsert_and_get_chat_session_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let row = sample_session("t1");
        store.upsert_chat_session(&row).unwrap();
        let fetched = store.get_chat_session_by_thread("t1").unwrap().unwrap();
        assert_eq!(fetched.session_id, row.session_id);
        assert_eq!(fetched.status, "active");
    }

    #[test]
    fn get_missing_chat_session_returns_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_chat_session_by_thread("missing").unwrap().is_none());
    }

    #[test]
    fn list_chat_sessions_returns_every_thread() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_chat_session(&sample_session("t1")).unwrap();
        store.upsert_chat_session(&sample_session("t2")).unwrap();
        let all = store.list_chat_sessions().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn thread_preview_is_set_once_and_kept() {
        let store = Store::open_in_memory().unwrap();
        store.create_thread("t1", "2026-01-01T00:00:00Z").unwrap();
        store.set_thread_preview_if_empty("t1", "first message").unwrap();
        store.set_thread_preview_if_empty("t1", "second message").unwrap();
        let thread = store.get_thread("t1").unwrap().unwrap();
        assert_eq!(thread.preview, "first message");
    }

    #[test]
    fn thread_messages_append_in_order() {
        let store = Store::open_in_memory().unwrap();
        store.create_thread("t1", "2026-01-01T00:00:00Z").unwrap();
        store.append_thread_message("t1", "user", "hello", "2026-01-01T00:00:01Z").unwrap();
        store.append_thread_message("t1", "assistant", "hi there", "2026-01-01T00:00:02Z").unwrap();

        let messages = store.load_thread_messages("t1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content, "hi there");
    }

    #[test]
    fn create_thread_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.create_thread("t1", "2026-01-01T00:00:00Z").unwrap();
        store.create_thread("t1", "2026-02-02T00:00:00Z").unwrap();
        let thread = store.get_thread("t1").unwrap().unwrap();
        assert_eq!(thread.created_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn delete_thread_removes_session_terminal_and_summaries() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_chat_session(&sample_session("t1")).unwrap();
        store
            .upsert_terminal(&AbstractTerminalRow { terminal_id: "term-t1".to_string(), thread_id: "t1".to_string(), lease_id: "lease-1".to_string(), state_json: "{}".to_string(), version: 0 })
            .unwrap();
        store.append_summary("t1", "summary", 10, 5, "2026-01-01T00:00:00Z").unwrap();
        store.create_thread("t1", "2026-01-01T00:00:00Z").unwrap();
        store.append_thread_message("t1", "user", "hello", "2026-01-01T00:00:01Z").unwrap();

        store.delete_thread("t1").unwrap();

        assert!(store.get_chat_session_by_thread("t1").unwrap().is_none());
        assert!(store.get_terminal_by_thread("t1").unwrap().is_none());
        assert!(store.load_all_summaries("t1").unwrap().is_empty());
        assert!(store.get_thread("t1").unwrap().is_none());
        assert!(store.load_thread_messages("t1").unwrap().is_empty());
    }

    #[test]
    fn terminal_state_update_increments_version_and_detects_conflict() {
        let store = Store::open_in_memory().unwrap();
        let row = AbstractTerminalRow {
            terminal_id: "term-1".to_string(),
            thread_id: "t1".to_string(),
            lease_id: "lease-1".to_string(),
            state_json: "{}".to_string(),
            version: 0,
        };
        store.upsert_terminal(&row).unwrap();
        let new_version = store.update_terminal_state("term-1", "{\"cwd\":\"/tmp\"}", 0).unwrap();
        assert_eq!(new_version, 1);

        let conflict = store.update_terminal_state("term-1", "{\"cwd\":\"/x\"}", 0);
        assert!(matches!(conflict, Err(StoreError::VersionConflict { .. })));
    }

    #[test]
    fn summaries_append_in_order() {
        let store = Store::open_in_memory().unwrap();
        let slot0 = store.append_summary("t1", "first", 10, 5, "2026-01-01T00:00:00Z").unwrap();
        let slot1 = store.append_summary("t1", "second", 20, 9, "2026-01-01T00:01:00Z").unwrap();
        assert_eq!(slot0, 0);
        assert_eq!(slot1, 1);

        let all = store.load_all_summaries("t1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.last().unwrap().content, "second");
    }

    #[test]
    fn run_events_replay_after_seq() {
        let store = Store::open_in_memory().unwrap();
        for seq in 0..5 {
            store
                .append_run_event("run-1", seq, "text", "{}", "2026-01-01T00:00:00Z")
                .unwrap();
        }
        let replayed = store.load_run_events_after("run-1", 2).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].seq, 3);
        assert_eq!(replayed[1].seq, 4);
    }
}
