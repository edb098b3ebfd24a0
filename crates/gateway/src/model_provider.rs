//! Anthropic-backed `ModelCaller` — the terminal call at the bottom of the
//! middleware onion. Concrete provider SDKs are out of the engine's scope,
//! so this lives in the gateway binary as the one place a real wire protocol
//! is spoken; everything below the `ModelCaller` trait stays provider-free.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use agentcore_middleware::{
    MiddlewareError, ModelCaller, ModelRequest, ModelResponse, ModelToolCall, Role, TokenUsage,
};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 8_192;

pub struct AnthropicModelCaller {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnthropicModelCaller {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn with_generation_params(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        if let Some(max_tokens) = max_tokens {
            self.max_tokens = max_tokens;
        }
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ModelCaller for AnthropicModelCaller {
    async fn call(&self, request: ModelRequest) -> agentcore_middleware::Result<ModelResponse> {
        let body = build_request_body(&request, self.max_tokens, self.temperature);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %request.model, "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MiddlewareError::Transient(format!("request failed: {e}")))?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5);
            return Err(MiddlewareError::Transient(format!(
                "rate limited, retry after {retry_after}s"
            )));
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
            return Err(if status >= 500 {
                MiddlewareError::Transient(format!("API error {status}: {text}"))
            } else {
                MiddlewareError::ProviderFatal(format!("API error {status}: {text}"))
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| MiddlewareError::Transient(format!("malformed response body: {e}")))?;

        Ok(parse_response(api_resp))
    }
}

fn cache_marker(flagged: bool) -> serde_json::Value {
    if flagged {
        serde_json::json!({"type": "text", "cache_control": {"type": "ephemeral"}})
    } else {
        serde_json::json!({"type": "text"})
    }
}

/// Splits the request's messages into the Anthropic `system` parameter
/// (content blocks, one per system message, carrying any cache markers the
/// middleware stack attached) and the conversational `messages` array.
fn build_request_body(request: &ModelRequest, max_tokens: u32, temperature: Option<f32>) -> serde_json::Value {
    let mut system_blocks: Vec<serde_json::Value> = Vec::new();
    let mut messages: Vec<serde_json::Value> = Vec::new();

    for m in &request.messages {
        let mut block = cache_marker(m.cache_control);
        block["text"] = serde_json::Value::String(m.content.clone());
        match m.role {
            Role::System => system_blocks.push(block),
            // The messages API has no free-standing tool role; tool results
            // travel as user-turn content.
            Role::User | Role::Tool => messages.push(serde_json::json!({"role": "user", "content": [block]})),
            Role::Assistant => messages.push(serde_json::json!({"role": "assistant", "content": [block]})),
        }
    }

    let mut body = serde_json::json!({
        "model": request.model,
        "max_tokens": max_tokens,
        "messages": messages,
        "stream": false,
    });

    if !system_blocks.is_empty() {
        body["system"] = serde_json::Value::Array(system_blocks);
    }
    if let Some(temperature) = temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

fn parse_response(resp: ApiResponse) -> ModelResponse {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ModelToolCall> = Vec::new();

    for block in resp.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ModelToolCall { id, name, arguments: input });
            }
            ContentBlock::Unknown => {}
        }
    }

    // Anthropic reports input_tokens already excluding cached reads, so the
    // buckets map across directly with no adjustment.
    let usage = TokenUsage {
        input: resp.usage.input_tokens as u64,
        output: resp.usage.output_tokens as u64,
        reasoning: 0,
        cache_read: resp.usage.cache_read_input_tokens.unwrap_or(0) as u64,
        cache_creation: resp.usage.cache_creation_input_tokens.unwrap_or(0) as u64,
    };

    ModelResponse {
        content: text_parts.join(""),
        tool_calls,
        usage,
        stop_reason: resp.stop_reason.unwrap_or_default(),
    }
}

const SUMMARY_PROMPT: &str = "Summarize the following agent conversation transcript. \
Preserve decisions made, file paths touched, commands run, and any unresolved work. \
Write a dense prose summary; do not add commentary.";

/// Backs compaction with the same `ModelCaller` the run loop uses.
/// `summary_model` (config `memory.compaction.summary_model`) overrides the
/// conversation's model when set.
pub struct ModelSummarizer {
    caller: std::sync::Arc<dyn ModelCaller>,
    summary_model: Option<String>,
}

impl ModelSummarizer {
    pub fn new(caller: std::sync::Arc<dyn ModelCaller>, summary_model: Option<String>) -> Self {
        Self { caller, summary_model }
    }
}

#[async_trait]
impl agentcore_memory::Summarizer for ModelSummarizer {
    async fn summarize(&self, model: &str, transcript: &str) -> agentcore_memory::Result<String> {
        let model = self.summary_model.clone().unwrap_or_else(|| model.to_string());
        let request = ModelRequest {
            model,
            messages: vec![
                agentcore_middleware::ChatMessage::new(Role::System, SUMMARY_PROMPT),
                agentcore_middleware::ChatMessage::new(Role::User, transcript),
            ],
            tools: Vec::new(),
        };
        let response = self
            .caller
            .call(request)
            .await
            .map_err(|e| agentcore_memory::MemoryError::SummarizationFailed { reason: e.to_string() })?;
        Ok(response.content)
    }
}

// Anthropic API response types (private — only used for deserialization)

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_middleware::{ChatMessage, ToolSchema};

    fn request() -> ModelRequest {
        let mut sys = ChatMessage::new(Role::System, "you are helpful");
        sys.cache_control = true;
        ModelRequest {
            model: "claude-sonnet-4-6".to_string(),
            messages: vec![sys, ChatMessage::new(Role::User, "hello")],
            tools: vec![ToolSchema {
                name: "read_file".to_string(),
                description: "read a file".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        }
    }

    #[test]
    fn system_messages_become_system_blocks_with_cache_markers() {
        let body = build_request_body(&request(), 1024, None);
        let system = body["system"].as_array().unwrap();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0]["cache_control"]["type"], "ephemeral");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn tools_are_injected_with_input_schema_field() {
        let body = build_request_body(&request(), 1024, None);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools[0]["name"], "read_file");
        assert!(tools[0]["input_schema"].is_object());
    }

    #[test]
    fn parse_response_separates_text_and_tool_use_blocks() {
        let api_resp = ApiResponse {
            content: vec![
                ContentBlock::Text { text: "let me check".to_string() },
                ContentBlock::ToolUse {
                    id: "tc1".to_string(),
                    name: "read_file".to_string(),
                    input: serde_json::json!({"path": "/tmp/a"}),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 20,
                cache_read_input_tokens: Some(50),
                cache_creation_input_tokens: None,
            },
        };
        let parsed = parse_response(api_resp);
        assert_eq!(parsed.content, "let me check");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "read_file");
        assert_eq!(parsed.usage.cache_read, 50);
        assert_eq!(parsed.stop_reason, "tool_use");
    }
}
