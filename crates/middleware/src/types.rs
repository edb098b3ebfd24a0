use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool result being fed back to the model. Providers without a
    /// dedicated tool role fold this into a user turn at the wire boundary.
    Tool,
}

/// One turn in the request sent to the model. Distinct from
/// `agentcore_memory::Message`: this is the wire-shaped view a middleware
/// mutates in flight (cache markers, synthetic notes), not the durable
/// conversation list the memory manager prunes/compacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Set by `PromptCaching` on the four breakpoint messages.
    #[serde(default)]
    pub cache_control: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), cache_control: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Outbound request to the LLM provider, as assembled by the middleware
/// stack's `wrap_model_call` chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.reasoning + self.cache_read + self.cache_creation
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ModelToolCall>,
    pub usage: TokenUsage,
    pub stop_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), is_error: false }
    }

    pub fn error(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), is_error: true }
    }
}

/// Per-run context threaded through `before_agent`/`after_agent` and carried
/// alongside every `wrap_model_call`/`wrap_tool_call`. Middlewares reach the
/// rest of the system (sandbox, queue, memory) only by looking things up via
/// `thread_id` against their own injected handles — never by holding a back
/// reference to the run or scheduler, which would make the ownership graph
/// cyclic.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub thread_id: String,
    pub run_id: String,
    /// System-prompt fragments contributed by middlewares (e.g. loaded
    /// skills), spliced in before the next `wrap_model_call`.
    pub system_fragments: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl AgentContext {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self { thread_id: thread_id.into(), run_id: run_id.into(), system_fragments: Vec::new(), metadata: HashMap::new() }
    }
}
