use rusqlite::Connection;

use crate::error::Result;

/// Create every table this crate owns, if missing.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS threads (
            thread_id  TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            preview    TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS thread_messages (
            thread_id  TEXT NOT NULL,
            idx        INTEGER NOT NULL,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (thread_id, idx)
        );

        CREATE TABLE IF NOT EXISTS chat_sessions (
            session_id     TEXT PRIMARY KEY,
            thread_id      TEXT NOT NULL UNIQUE,
            terminal_id    TEXT NOT NULL,
            status         TEXT NOT NULL,
            created_at     TEXT NOT NULL,
            last_active_at TEXT NOT NULL,
            policy_json    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_sessions_thread
            ON chat_sessions(thread_id);

        CREATE TABLE IF NOT EXISTS abstract_terminals (
            terminal_id TEXT PRIMARY KEY,
            thread_id   TEXT NOT NULL UNIQUE,
            lease_id    TEXT NOT NULL,
            state_json  TEXT NOT NULL,
            version     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS sandbox_leases (
            lease_id      TEXT PRIMARY KEY,
            provider_name TEXT NOT NULL,
            instance_json TEXT
        );

        CREATE TABLE IF NOT EXISTS summaries (
            thread_id                     TEXT NOT NULL,
            slot_index                    INTEGER NOT NULL,
            content                       TEXT NOT NULL,
            token_count                   INTEGER NOT NULL,
            message_count_at_compaction   INTEGER NOT NULL DEFAULT 0,
            created_at                    TEXT NOT NULL,
            PRIMARY KEY (thread_id, slot_index)
        );

        CREATE TABLE IF NOT EXISTS run_events (
            run_id     TEXT NOT NULL,
            seq        INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            data_json  TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (run_id, seq)
        );",
    )?;
    Ok(())
}

/// Open (creating if absent) a SQLite connection with WAL and foreign keys
/// enabled, then run [`init_db`].
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    init_db(&conn)?;
    Ok(conn)
}
