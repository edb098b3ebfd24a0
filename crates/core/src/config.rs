use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::QueueMode;

/// Default context window assumed for a model when the provider doesn't
/// report one and the user hasn't overridden `agent.context_limit`.
pub const DEFAULT_CONTEXT_LIMIT: u64 = 100_000;
pub const DEFAULT_SOFT_TRIM_CHARS: usize = 4_000;
pub const DEFAULT_HARD_CLEAR_THRESHOLD: usize = 20_000;
pub const DEFAULT_PROTECT_RECENT_TURNS: usize = 4;
pub const DEFAULT_RESERVE_TOKENS: u64 = 8_000;
pub const DEFAULT_MAX_CONCURRENT_TOOLS: usize = 8;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Top-level config (agentcore.toml + AGENTCORE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCoreConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    /// Per-tool-category overrides, keyed by category name (e.g. "filesystem",
    /// "command", "search"). Absent entries fall back to `enabled: true` and
    /// no per-tool overrides.
    #[serde(default)]
    pub tool: HashMap<String, ToolCategoryConfig>,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Default for AgentCoreConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            agent: AgentConfig::default(),
            tool: HashMap::new(),
            mcp: McpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { bind: default_bind(), port: default_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Either a concrete provider model id or a virtual name resolved via
    /// [`resolve_virtual_model`] (e.g. "agentcore:medium").
    #[serde(default = "default_model")]
    pub model: String,
    pub model_provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub workspace_root: Option<String>,
    #[serde(default = "default_context_limit")]
    pub context_limit: u64,
    #[serde(default)]
    pub queue_mode: QueueMode,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            model_provider: None,
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            workspace_root: None,
            context_limit: default_context_limit(),
            queue_mode: QueueMode::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pruning: PruningConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

/// Structural truncation of old tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Truncate a tool result's body to this many chars once it falls
    /// outside the protected recent-turns window.
    #[serde(default = "default_soft_trim_chars")]
    pub soft_trim_chars: usize,
    /// Above this char count a tool result is cleared to a placeholder
    /// instead of merely trimmed.
    #[serde(default = "default_hard_clear_threshold")]
    pub hard_clear_threshold: usize,
    /// Number of most recent turns exempt from pruning entirely.
    #[serde(default = "default_protect_recent_turns")]
    pub protect_recent_turns: usize,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            soft_trim_chars: default_soft_trim_chars(),
            hard_clear_threshold: default_hard_clear_threshold(),
            protect_recent_turns: default_protect_recent_turns(),
        }
    }
}

/// LLM-driven semantic compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compaction triggers when the estimated token count of the live
    /// conversation reaches `context_limit - reserve_tokens`.
    #[serde(default = "default_reserve_tokens")]
    pub reserve_tokens: u64,
    /// Model used to produce the summary, defaults to `agent.model` when unset.
    pub summary_model: Option<String>,
    /// Individual messages longer than this are split into their own turn
    /// before head/tail partitioning, so a single oversized message can't
    /// force the whole head into the summary.
    #[serde(default = "default_split_turn_chars")]
    pub split_turn_chars: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            reserve_tokens: default_reserve_tokens(),
            summary_model: None,
            split_turn_chars: default_split_turn_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCategoryConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Per-tool-name overrides within this category; absent entries default
    /// to enabled.
    #[serde(default)]
    pub tools: HashMap<String, bool>,
}

impl ToolCategoryConfig {
    pub fn tool_enabled(&self, tool_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.tools.get(tool_name).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn bool_true() -> bool {
    true
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7700
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.agentcore/agentcore.db")
}
fn default_model() -> String {
    "agentcore:balanced".to_string()
}
fn default_context_limit() -> u64 {
    DEFAULT_CONTEXT_LIMIT
}
fn default_soft_trim_chars() -> usize {
    DEFAULT_SOFT_TRIM_CHARS
}
fn default_hard_clear_threshold() -> usize {
    DEFAULT_HARD_CLEAR_THRESHOLD
}
fn default_protect_recent_turns() -> usize {
    DEFAULT_PROTECT_RECENT_TURNS
}
fn default_reserve_tokens() -> u64 {
    DEFAULT_RESERVE_TOKENS
}
fn default_split_turn_chars() -> usize {
    50_000
}

/// Virtual model names the engine resolves to a concrete provider model id
/// at call time, so config/tooling can talk about capability tiers instead
/// of provider-specific strings. Resolution is a flat lookup; an unknown
/// `agentcore:*` name is a config error, anything else passes through
/// unchanged as an already-concrete model id.
pub fn resolve_virtual_model(name: &str) -> Option<&'static str> {
    match name {
        "agentcore:mini" => Some("claude-haiku-4-5"),
        "agentcore:fast" => Some("claude-haiku-4-5"),
        "agentcore:medium" => Some("claude-sonnet-4-6"),
        "agentcore:balanced" => Some("claude-sonnet-4-6"),
        "agentcore:large" => Some("claude-opus-4-6"),
        "agentcore:max" => Some("claude-opus-4-6"),
        "agentcore:powerful" => Some("claude-opus-4-6"),
        "agentcore:coding" => Some("claude-sonnet-4-6"),
        "agentcore:research" => Some("claude-opus-4-6"),
        "agentcore:creative" => Some("claude-opus-4-6"),
        _ => None,
    }
}

impl AgentConfig {
    /// The concrete model id to send to the provider, after virtual-name
    /// resolution and `${VAR}` environment expansion.
    pub fn resolved_model(&self) -> crate::error::Result<String> {
        let expanded = expand_env(&self.model);
        if let Some(stripped) = expanded.strip_prefix("agentcore:") {
            return resolve_virtual_model(&format!("agentcore:{stripped}"))
                .map(str::to_string)
                .ok_or_else(|| {
                    crate::error::EngineError::Config(format!(
                        "unknown virtual model name: agentcore:{stripped}"
                    ))
                });
        }
        Ok(expanded)
    }
}

/// Expands `${VAR}` references against the process environment, leaving the
/// reference untouched (rather than erroring) when the variable is unset —
/// config values are often optional and a missing key shouldn't be fatal
/// until the field is actually used.
pub fn expand_env(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end_rel];
        match std::env::var(var_name) {
            Ok(val) => out.push_str(&val),
            Err(_) => {
                out.push_str("${");
                out.push_str(var_name);
                out.push('}');
            }
        }
        rest = &rest[start + end_rel + 1..];
    }
    out.push_str(rest);
    out
}

impl AgentCoreConfig {
    /// Load config, merging (lowest to highest precedence):
    ///   1. struct defaults
    ///   2. `~/.agentcore/agentcore.toml` (user-wide)
    ///   3. `./agentcore.toml` (project-local, if present)
    ///   4. `AGENTCORE_*` environment variables
    ///
    /// An explicit `config_path` argument, when given, is merged instead of
    /// the project-local file at step 3.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let project_path = config_path
            .map(String::from)
            .unwrap_or_else(|| "agentcore.toml".to_string());

        let config: AgentCoreConfig = Figment::from(figment::providers::Serialized::defaults(
            AgentCoreConfig::default(),
        ))
        .merge(Toml::file(default_user_config_path()))
        .merge(Toml::file(project_path))
        .merge(Env::prefixed("AGENTCORE_").split("__"))
        .extract()
        .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_user_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.agentcore/agentcore.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_figment() {
        let cfg = AgentCoreConfig::default();
        assert_eq!(cfg.agent.context_limit, DEFAULT_CONTEXT_LIMIT);
        assert_eq!(cfg.agent.queue_mode, QueueMode::Steer);
    }

    #[test]
    fn virtual_model_resolves() {
        assert_eq!(resolve_virtual_model("agentcore:mini"), Some("claude-haiku-4-5"));
        assert_eq!(resolve_virtual_model("agentcore:unknown"), None);
    }

    #[test]
    fn expand_env_leaves_missing_var_untouched() {
        std::env::remove_var("AGENTCORE_TEST_VAR_DOES_NOT_EXIST");
        let out = expand_env("prefix-${AGENTCORE_TEST_VAR_DOES_NOT_EXIST}-suffix");
        assert_eq!(out, "prefix-${AGENTCORE_TEST_VAR_DOES_NOT_EXIST}-suffix");
    }

    #[test]
    fn expand_env_substitutes_present_var() {
        std::env::set_var("AGENTCORE_TEST_VAR_PRESENT", "hello");
        let out = expand_env("value=${AGENTCORE_TEST_VAR_PRESENT}");
        assert_eq!(out, "value=hello");
    }

    #[test]
    fn tool_category_tool_enabled_respects_category_and_override() {
        let mut tools = HashMap::new();
        tools.insert("delete_file".to_string(), false);
        let cat = ToolCategoryConfig { enabled: true, tools };
        assert!(cat.tool_enabled("read_file"));
        assert!(!cat.tool_enabled("delete_file"));

        let disabled_cat = ToolCategoryConfig { enabled: false, tools: HashMap::new() };
        assert!(!disabled_cat.tool_enabled("read_file"));
    }
}
