use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Policy window lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Expired,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Expired => "expired",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SessionStatus::Active,
            "paused" => SessionStatus::Paused,
            "expired" => SessionStatus::Expired,
            _ => SessionStatus::Closed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Closed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicy {
    pub idle_timeout_seconds: u64,
    pub max_duration_seconds: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self { idle_timeout_seconds: 1800, max_duration_seconds: 86_400 }
    }
}

/// Durable (cwd, env-delta, version) snapshot owned by an `AbstractTerminal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminalState {
    pub cwd: String,
    pub env_delta: HashMap<String, String>,
    pub version: i64,
}

impl TerminalState {
    pub fn new(cwd: impl Into<String>) -> Self {
        Self { cwd: cwd.into(), env_delta: HashMap::new(), version: 0 }
    }
}

/// Lifecycle state of a `SandboxLease`'s underlying compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    Paused,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub state: InstanceState,
    pub started_at: String,
}

/// Parameters handed to `Provider::create_instance`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub workspace_root: Option<String>,
}

/// Result of `Provider::exec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Result of `Provider::metrics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub uptime_seconds: u64,
}
