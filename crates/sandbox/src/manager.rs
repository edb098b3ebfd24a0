use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentcore_store::types::{AbstractTerminalRow, ChatSessionRow, SandboxLeaseRow};
use agentcore_store::Store;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::chat_session::ChatSession;
use crate::error::Result;
use crate::lease::SandboxLease;
use crate::provider::Provider;
use crate::runtime::{PhysicalTerminalRuntime, RuntimeKind};
use crate::terminal::AbstractTerminal;
use crate::types::{SessionPolicy, SessionStatus, TerminalState};

/// A thin description of a registered sandbox provider, for
/// `GET /api/sandbox/types`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SandboxTypeInfo {
    pub name: String,
    pub available: bool,
    pub reason: Option<String>,
}

/// What `SandboxManager::get_sandbox` hands back to a caller — the live
/// session, the durable terminal handle, the lease, and a ready-to-use
/// runtime.
pub struct SandboxCapability {
    pub session: ChatSession,
    pub terminal: AbstractTerminal,
    pub lease: Arc<SandboxLease>,
    pub runtime: PhysicalTerminalRuntime,
}

/// Orchestrates creation and reuse across ChatSession / AbstractTerminal /
/// SandboxLease.
pub struct SandboxManager {
    store: Arc<Store>,
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
    default_cwd: String,
    terminal_locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
    lease_locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
    exec_timeout: Duration,
}

impl SandboxManager {
    pub fn new(store: Arc<Store>, default_provider: String, exec_timeout: Duration) -> Self {
        Self {
            store,
            providers: HashMap::new(),
            default_provider,
            default_cwd: "/workspace".to_string(),
            terminal_locks: Arc::new(DashMap::new()),
            lease_locks: Arc::new(DashMap::new()),
            exec_timeout,
        }
    }

    /// Initial cwd for terminals created without an explicit one.
    pub fn with_default_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.default_cwd = cwd.into();
        self
    }

    pub fn register_provider(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn sandbox_types(&self) -> Vec<SandboxTypeInfo> {
        self.providers
            .keys()
            .map(|name| SandboxTypeInfo { name: name.clone(), available: true, reason: None })
            .collect()
    }

    /// Return the active capability for `thread_id`, creating the
    /// ChatSession/terminal/lease triple on first access. The session is
    /// created together with (or reusing) the terminal and lease, never
    /// half-wired.
    pub async fn get_sandbox(&self, thread_id: &str, cwd: Option<&str>) -> Result<SandboxCapability> {
        self.get_sandbox_with_provider(thread_id, cwd, None).await
    }

    /// Like [`SandboxManager::get_sandbox`], but a named provider overrides
    /// the default for any lease created by this call — backs the `sandbox`
    /// field of `POST /api/threads`. An existing lease keeps its provider.
    pub async fn get_sandbox_with_provider(
        &self,
        thread_id: &str,
        cwd: Option<&str>,
        provider: Option<&str>,
    ) -> Result<SandboxCapability> {
        if let Some(name) = provider {
            if !self.providers.contains_key(name) {
                return Err(crate::error::SandboxError::UnknownProvider(name.to_string()));
            }
        }
        let now = Utc::now();

        let existing = self.store.get_chat_session_by_thread(thread_id)?;
        let needs_new_session = match &existing {
            Some(row) => {
                let mut session = ChatSession::from_row(row)?;
                // Lazy reap: an expired-but-unmarked session is marked here
                // rather than waiting for the background sweeper.
                if !session.status.is_terminal() && session.is_expired(now) {
                    session.mark_expired(&self.store, now).await?;
                    true
                } else {
                    session.status.is_terminal()
                }
            }
            None => true,
        };

        let session = if needs_new_session {
            self.create_session(thread_id, cwd, provider, now).await?
        } else {
            ChatSession::from_row(existing.as_ref().unwrap())?
        };

        let terminal_row = self
            .store
            .get_terminal_by_thread(thread_id)?
            .expect("terminal row is created alongside the chat session");

        let lease = self.load_or_build_lease(&terminal_row.lease_id)?;
        let runtime_terminal = AbstractTerminal::new(
            terminal_row.terminal_id.clone(),
            thread_id.to_string(),
            terminal_row.lease_id.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.terminal_locks),
        );
        let runtime = PhysicalTerminalRuntime::new(RuntimeKind::Local, runtime_terminal, Arc::clone(&lease), self.exec_timeout);

        let terminal = AbstractTerminal::new(
            terminal_row.terminal_id,
            thread_id.to_string(),
            terminal_row.lease_id,
            Arc::clone(&self.store),
            Arc::clone(&self.terminal_locks),
        );

        Ok(SandboxCapability { session, terminal, lease, runtime })
    }

    async fn create_session(
        &self,
        thread_id: &str,
        cwd: Option<&str>,
        provider: Option<&str>,
        now: chrono::DateTime<Utc>,
    ) -> Result<ChatSession> {
        let terminal_row = self.store.get_terminal_by_thread(thread_id)?;
        let (terminal_id, lease_id) = match terminal_row {
            Some(row) => (row.terminal_id, row.lease_id),
            None => {
                let terminal_id = agentcore_core::types::TerminalId::new().to_string();
                let lease_id = agentcore_core::types::LeaseId::new().to_string();
                let state = TerminalState::new(cwd.unwrap_or(&self.default_cwd));
                self.store.upsert_lease(&SandboxLeaseRow {
                    lease_id: lease_id.clone(),
                    provider_name: provider.unwrap_or(&self.default_provider).to_string(),
                    instance_json: None,
                })?;
                self.store.upsert_terminal(&AbstractTerminalRow {
                    terminal_id: terminal_id.clone(),
                    thread_id: thread_id.to_string(),
                    lease_id: lease_id.clone(),
                    state_json: serde_json::to_string(&state)?,
                    version: 0,
                })?;
                (terminal_id, lease_id)
            }
        };

        let session_id = agentcore_core::types::SessionId::new().to_string();
        let policy = SessionPolicy::default();
        self.store.upsert_chat_session(&ChatSessionRow {
            session_id: session_id.clone(),
            thread_id: thread_id.to_string(),
            terminal_id: terminal_id.clone(),
            status: SessionStatus::Active.as_str().to_string(),
            created_at: now.to_rfc3339(),
            last_active_at: now.to_rfc3339(),
            policy_json: serde_json::to_string(&policy)?,
        })?;

        info!(thread_id, session_id, terminal_id, lease_id, "created chat session");

        Ok(ChatSession {
            session_id,
            thread_id: thread_id.to_string(),
            terminal_id,
            status: SessionStatus::Active,
            created_at: now,
            last_active_at: now,
            policy,
        })
    }

    fn load_or_build_lease(&self, lease_id: &str) -> Result<Arc<SandboxLease>> {
        let row = self.store.get_lease(lease_id)?;
        let provider_name = row.map(|r| r.provider_name).unwrap_or_else(|| self.default_provider.clone());
        let provider = self
            .providers
            .get(&provider_name)
            .cloned()
            .unwrap_or_else(|| self.providers.get(&self.default_provider).cloned().expect("default provider registered"));
        let lock = self.lease_locks.entry(lease_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone();
        Ok(Arc::new(SandboxLease::new(lease_id.to_string(), provider, Arc::clone(&self.store), lock)))
    }

    /// Extend the thread's session window after a successful tool execution.
    pub async fn touch(&self, thread_id: &str) -> Result<()> {
        self.store.touch_chat_session(thread_id, &Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// Invalidates the thread's sandbox after a fatal provider failure: the
    /// session closes and the lease's instance record is dropped, so the
    /// next access builds a fresh session and instance. The lease identity
    /// itself survives.
    pub async fn handle_provider_fatal(&self, thread_id: &str) -> Result<()> {
        let now = Utc::now();
        if let Some(row) = self.store.get_chat_session_by_thread(thread_id)? {
            let mut session = ChatSession::from_row(&row)?;
            if !session.status.is_terminal() {
                session.close(&self.store, now).await?;
            }
        }
        if let Some(terminal) = self.store.get_terminal_by_thread(thread_id)? {
            self.store.update_lease_instance(&terminal.lease_id, None)?;
        }
        Ok(())
    }

    /// Every thread id with a persisted chat session — the sweep set for
    /// [`SandboxManager::reap_expired`].
    pub fn known_thread_ids(&self) -> Result<Vec<String>> {
        Ok(self.store.list_chat_sessions()?.into_iter().map(|row| row.thread_id).collect())
    }

    /// Reaps sessions whose idle/max-duration policy has lapsed. Intended to
    /// be invoked by a background sweeper on an interval of
    /// `idle_timeout / 10`, and lazily from `get_sandbox` before
    /// every access.
    pub async fn reap_expired(&self, thread_ids: &[String]) -> Result<usize> {
        let now = Utc::now();
        let mut reaped = 0;
        for thread_id in thread_ids {
            if let Some(row) = self.store.get_chat_session_by_thread(thread_id)? {
                let mut session = ChatSession::from_row(&row)?;
                if !session.status.is_terminal() && session.is_expired(now) {
                    session.mark_expired(&self.store, now).await?;
                    reaped += 1;
                }
            }
        }
        Ok(reaped)
    }
}
