use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AgentContext, ModelRequest, ModelResponse, ToolCall, ToolResult};

/// The tail of a `wrap_model_call` chain — what `next` resolves to once
/// every middleware has had a turn. The scheduler provides the concrete
/// implementation (the actual provider call).
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn call(&self, request: ModelRequest) -> Result<ModelResponse>;
}

#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn call(&self, call: ToolCall) -> Result<ToolResult>;
}

/// A single interception point around model calls and tool calls, composed
/// in an onion: instead of a flat list of independent hooks, each middleware
/// wraps the next one and decides whether/how to call it, so it can inspect
/// or rewrite both the outbound call and the inbound result.
///
/// Contract: a middleware MUST call `next` at most once per
/// invocation it consumes, and MUST propagate failures upstream unless it
/// explicitly recovers. Default method bodies simply forward to `next`, so
/// a middleware only needs to override the interception points it cares
/// about.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Tool schemas this middleware contributes to the outbound request's
    /// tool list. Most middlewares contribute none (stateless
    /// rewriters/observers); `FileSystem`, `Command`, `Search`, `Skill`,
    /// `Task`, and `Todo` each declare the tools they handle.
    fn tool_schemas(&self) -> Vec<crate::types::ToolSchema> {
        Vec::new()
    }

    async fn before_agent(&self, _ctx: &mut AgentContext) -> Result<()> {
        Ok(())
    }

    async fn after_agent(&self, _ctx: &mut AgentContext) -> Result<()> {
        Ok(())
    }

    async fn wrap_model_call(&self, ctx: &AgentContext, request: ModelRequest, next: &dyn ModelCaller) -> Result<ModelResponse> {
        let _ = ctx;
        next.call(request).await
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        let _ = ctx;
        next.call(call).await
    }
}

/// Recursive link in the onion chain: calls middleware `stack[0]`, passing
/// itself (rebuilt over `stack[1..]`) as that middleware's `next`. When the
/// stack is empty, falls through to `terminal` — the real provider/tool
/// call at the bottom of the chain.
struct ModelChainLink<'a> {
    ctx: &'a AgentContext,
    stack: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn ModelCaller,
}

#[async_trait]
impl<'a> ModelCaller for ModelChainLink<'a> {
    async fn call(&self, request: ModelRequest) -> Result<ModelResponse> {
        match self.stack.split_first() {
            Some((mw, rest)) => {
                let next = ModelChainLink { ctx: self.ctx, stack: rest, terminal: self.terminal };
                mw.wrap_model_call(self.ctx, request, &next).await
            }
            None => self.terminal.call(request).await,
        }
    }
}

struct ToolChainLink<'a> {
    ctx: &'a AgentContext,
    stack: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn ToolCaller,
}

#[async_trait]
impl<'a> ToolCaller for ToolChainLink<'a> {
    async fn call(&self, call: ToolCall) -> Result<ToolResult> {
        match self.stack.split_first() {
            Some((mw, rest)) => {
                let next = ToolChainLink { ctx: self.ctx, stack: rest, terminal: self.terminal };
                mw.wrap_tool_call(self.ctx, call, &next).await
            }
            None => self.terminal.call(call).await,
        }
    }
}

/// Ordered middleware list applied outermost-first on the way in,
/// innermost-first on the way out.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    middlewares: Vec<Arc<dyn Middleware>>,
    /// Per-tool enablement from configuration. A filtered-out tool is
    /// neither advertised to the model nor dispatchable.
    tool_filter: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self { middlewares: Vec::new(), tool_filter: None }
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn set_tool_filter(&mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> &mut Self {
        self.tool_filter = Some(Arc::new(filter));
        self
    }

    fn tool_enabled(&self, name: &str) -> bool {
        self.tool_filter.as_ref().map(|f| f(name)).unwrap_or(true)
    }

    /// Union of every middleware's declared tool schemas, in stack order,
    /// minus anything configuration has disabled.
    pub fn all_tool_schemas(&self) -> Vec<crate::types::ToolSchema> {
        self.middlewares.iter().flat_map(|mw| mw.tool_schemas()).filter(|s| self.tool_enabled(&s.name)).collect()
    }

    pub async fn run_model_call(
        &self,
        ctx: &AgentContext,
        request: ModelRequest,
        terminal: &dyn ModelCaller,
    ) -> Result<ModelResponse> {
        let chain = ModelChainLink { ctx, stack: &self.middlewares, terminal };
        chain.call(request).await
    }

    pub async fn run_tool_call(&self, ctx: &AgentContext, call: ToolCall, terminal: &dyn ToolCaller) -> Result<ToolResult> {
        if !self.tool_enabled(&call.name) {
            return Err(crate::error::MiddlewareError::invalid_input(
                format!("tool {} is disabled by configuration", call.name),
                "use one of the tools advertised in the request",
            ));
        }
        let chain = ToolChainLink { ctx, stack: &self.middlewares, terminal };
        chain.call(call).await
    }

    /// Called once per run, list order (outermost-first, same as the
    /// model/tool-call chain's entry direction).
    pub async fn run_before_agent(&self, ctx: &mut AgentContext) -> Result<()> {
        for mw in &self.middlewares {
            mw.before_agent(ctx).await?;
        }
        Ok(())
    }

    /// Called once per run, reverse list order — mirrors the onion's unwind
    /// direction so the middleware that was entered last also cleans up
    /// first.
    pub async fn run_after_agent(&self, ctx: &mut AgentContext) -> Result<()> {
        for mw in self.middlewares.iter().rev() {
            mw.after_agent(ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ModelToolCall, Role, TokenUsage};

    struct Uppercase;

    #[async_trait]
    impl Middleware for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }

        async fn wrap_model_call(&self, ctx: &AgentContext, mut request: ModelRequest, next: &dyn ModelCaller) -> Result<ModelResponse> {
            for m in &mut request.messages {
                m.content = m.content.to_uppercase();
            }
            let _ = ctx;
            let mut response = next.call(request).await?;
            response.content = format!("[{}]", response.content);
            Ok(response)
        }
    }

    struct Echo;

    #[async_trait]
    impl ModelCaller for Echo {
        async fn call(&self, request: ModelRequest) -> Result<ModelResponse> {
            Ok(ModelResponse {
                content: request.messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                tool_calls: Vec::<ModelToolCall>::new(),
                usage: TokenUsage::default(),
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn chain_applies_middleware_around_terminal_call() {
        let mut stack = MiddlewareStack::new();
        stack.push(Arc::new(Uppercase));
        let ctx = AgentContext::new("t1", "r1");
        let request = ModelRequest { model: "m".to_string(), messages: vec![ChatMessage::new(Role::User, "hi")], tools: vec![] };

        let response = stack.run_model_call(&ctx, request, &Echo).await.unwrap();
        assert_eq!(response.content, "[HI]");
    }

    #[tokio::test]
    async fn disabled_tool_is_neither_advertised_nor_dispatchable() {
        struct OneTool;

        #[async_trait]
        impl Middleware for OneTool {
            fn name(&self) -> &str {
                "one_tool"
            }

            fn tool_schemas(&self) -> Vec<crate::types::ToolSchema> {
                vec![crate::types::ToolSchema {
                    name: "secret_tool".to_string(),
                    description: String::new(),
                    parameters: serde_json::json!({}),
                }]
            }
        }

        struct NeverReached;

        #[async_trait]
        impl crate::chain::ToolCaller for NeverReached {
            async fn call(&self, call: crate::types::ToolCall) -> Result<crate::types::ToolResult> {
                Err(crate::error::MiddlewareError::UnknownTool(call.name))
            }
        }

        let mut stack = MiddlewareStack::new();
        stack.push(Arc::new(OneTool));
        stack.set_tool_filter(|name| name != "secret_tool");

        assert!(stack.all_tool_schemas().is_empty());

        let ctx = AgentContext::new("t1", "r1");
        let call = crate::types::ToolCall { id: "1".into(), name: "secret_tool".into(), arguments: serde_json::json!({}) };
        let result = stack.run_tool_call(&ctx, call, &NeverReached).await;
        assert!(matches!(result, Err(crate::error::MiddlewareError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn empty_stack_falls_through_to_terminal() {
        let stack = MiddlewareStack::new();
        let ctx = AgentContext::new("t1", "r1");
        let request = ModelRequest { model: "m".to_string(), messages: vec![ChatMessage::new(Role::User, "hi")], tools: vec![] };
        let response = stack.run_model_call(&ctx, request, &Echo).await.unwrap();
        assert_eq!(response.content, "hi");
    }
}
