use agentcore_store::types::ChatSessionRow;
use agentcore_store::Store;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{SessionPolicy, SessionStatus};

/// The active policy window for a thread.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub session_id: String,
    pub thread_id: String,
    pub terminal_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub policy: SessionPolicy,
}

impl ChatSession {
    pub fn from_row(row: &ChatSessionRow) -> Result<Self> {
        Ok(Self {
            session_id: row.session_id.clone(),
            thread_id: row.thread_id.clone(),
            terminal_id: row.terminal_id.clone(),
            status: SessionStatus::parse(&row.status),
            created_at: parse_rfc3339(&row.created_at),
            last_active_at: parse_rfc3339(&row.last_active_at),
            policy: serde_json::from_str(&row.policy_json).unwrap_or_default(),
        })
    }

    /// `is_expired ⇔ now − last_active_at ≥ idle_timeout ∨ now − created_at ≥ max_duration`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.last_active_at).num_seconds();
        let age = now.signed_duration_since(self.created_at).num_seconds();
        idle >= self.policy.idle_timeout_seconds as i64 || age >= self.policy.max_duration_seconds as i64
    }

    /// Update `last_active_at` and persist, called after every successful
    /// tool execution.
    pub async fn touch(&mut self, store: &Store, now: DateTime<Utc>) -> Result<()> {
        self.last_active_at = now;
        store.touch_chat_session(&self.thread_id, &now.to_rfc3339())?;
        Ok(())
    }

    /// Release the runtime (but not the lease) — the lease persists so the
    /// next session for this thread can reuse the underlying compute.
    pub async fn close(&mut self, store: &Store, now: DateTime<Utc>) -> Result<()> {
        self.status = SessionStatus::Closed;
        self.last_active_at = now;
        store.update_chat_session_status(&self.thread_id, self.status.as_str(), &now.to_rfc3339())?;
        Ok(())
    }

    pub async fn mark_expired(&mut self, store: &Store, now: DateTime<Utc>) -> Result<()> {
        self.status = SessionStatus::Expired;
        store.update_chat_session_status(&self.thread_id, self.status.as_str(), &now.to_rfc3339())?;
        Ok(())
    }

    pub async fn pause(&mut self, store: &Store, now: DateTime<Utc>) -> Result<()> {
        self.status = SessionStatus::Paused;
        store.update_chat_session_status(&self.thread_id, self.status.as_str(), &now.to_rfc3339())?;
        Ok(())
    }

    pub async fn resume(&mut self, store: &Store, now: DateTime<Utc>) -> Result<()> {
        self.status = SessionStatus::Active;
        self.last_active_at = now;
        store.update_chat_session_status(&self.thread_id, self.status.as_str(), &now.to_rfc3339())?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}
