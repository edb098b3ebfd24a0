//! `Search` middleware: injects `web_search`/`web_fetch` tools backed by an
//! ordered fallback chain of providers. Fails the tool call only once every
//! provider in the chain has failed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::chain::{Middleware, ToolCaller};
use crate::error::{MiddlewareError, Result};
use crate::types::{AgentContext, ToolCall, ToolResult, ToolSchema};

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> std::result::Result<String, String>;
    async fn fetch(&self, url: &str) -> std::result::Result<String, String>;
}

/// Deterministic fixture provider for tests and offline development.
pub struct StaticSearchProvider {
    pub label: &'static str,
    pub fail: bool,
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn name(&self) -> &str {
        self.label
    }

    async fn search(&self, query: &str) -> std::result::Result<String, String> {
        if self.fail {
            Err(format!("{} unavailable", self.label))
        } else {
            Ok(format!("[{}] results for: {query}", self.label))
        }
    }

    async fn fetch(&self, url: &str) -> std::result::Result<String, String> {
        if self.fail {
            Err(format!("{} unavailable", self.label))
        } else {
            Ok(format!("[{}] fetched: {url}", self.label))
        }
    }
}

pub struct SearchMiddleware {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl SearchMiddleware {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    async fn try_providers<F, Fut>(&self, op: F) -> Result<String>
    where
        F: Fn(Arc<dyn SearchProvider>) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<String, String>>,
    {
        let mut errors = Vec::new();
        for provider in &self.providers {
            match op(provider.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => errors.push(format!("{}: {e}", provider.name())),
            }
        }
        Err(MiddlewareError::AllProvidersFailed(errors.join("; ")))
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
}

#[derive(Deserialize)]
struct WebFetchArgs {
    url: String,
}

#[async_trait]
impl Middleware for SearchMiddleware {
    fn name(&self) -> &str {
        "search"
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "web_search".to_string(),
                description: "Search the web for a query, falling back across providers until one succeeds.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{"query":{"type":"string"}},"required":["query"]}),
            },
            ToolSchema {
                name: "web_fetch".to_string(),
                description: "Fetch the contents of a URL, falling back across providers until one succeeds.".to_string(),
                parameters: serde_json::json!({"type":"object","properties":{"url":{"type":"string"}},"required":["url"]}),
            },
        ]
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        let _ = ctx;
        match call.name.as_str() {
            "web_search" => {
                let args: WebSearchArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"query\": \"...\"}"))?;
                let query = args.query.clone();
                let content = self.try_providers(|p| {
                    let query = query.clone();
                    async move { p.search(&query).await }
                }).await?;
                Ok(ToolResult::ok(call.id, content))
            }
            "web_fetch" => {
                let args: WebFetchArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"url\": \"...\"}"))?;
                let url = args.url.clone();
                let content = self.try_providers(|p| {
                    let url = url.clone();
                    async move { p.fetch(&url).await }
                }).await?;
                Ok(ToolResult::ok(call.id, content))
            }
            other => next.call(ToolCall { name: other.to_string(), ..call }).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl ToolCaller for Unreachable {
        async fn call(&self, call: ToolCall) -> Result<ToolResult> {
            Err(MiddlewareError::UnknownTool(call.name))
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_provider_on_first_failure() {
        let mw = SearchMiddleware::new(vec![
            Arc::new(StaticSearchProvider { label: "primary", fail: true }),
            Arc::new(StaticSearchProvider { label: "backup", fail: false }),
        ]);
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "web_search".into(), arguments: serde_json::json!({"query": "rust"}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(result.content.contains("backup"));
    }

    #[tokio::test]
    async fn fails_only_when_every_provider_fails() {
        let mw = SearchMiddleware::new(vec![
            Arc::new(StaticSearchProvider { label: "primary", fail: true }),
            Arc::new(StaticSearchProvider { label: "backup", fail: true }),
        ]);
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "web_fetch".into(), arguments: serde_json::json!({"url": "https://example.com"}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await;
        assert!(matches!(result, Err(MiddlewareError::AllProvidersFailed(_))));
    }

    #[tokio::test]
    async fn unrelated_tool_falls_through() {
        let mw = SearchMiddleware::new(vec![Arc::new(StaticSearchProvider { label: "primary", fail: false })]);
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "read_file".into(), arguments: serde_json::json!({}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await;
        assert!(matches!(result, Err(MiddlewareError::UnknownTool(_))));
    }
}
