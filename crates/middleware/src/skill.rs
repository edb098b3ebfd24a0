//! `Skill` middleware: progressive disclosure of reusable
//! instruction bundles. `load_skill` splices a skill's body into the next
//! model call's system fragments; skills stay loaded for the rest of the
//! thread so they are not paid for twice.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::chain::{Middleware, ToolCaller};
use crate::error::{MiddlewareError, Result};
use crate::types::{AgentContext, ToolCall, ToolResult, ToolSchema};

#[derive(Clone)]
pub struct SkillDefinition {
    pub name: String,
    pub summary: String,
    pub body: String,
}

pub struct SkillMiddleware {
    catalog: HashMap<String, SkillDefinition>,
    loaded: DashMap<String, HashSet<String>>,
}

impl SkillMiddleware {
    pub fn new(skills: Vec<SkillDefinition>) -> Self {
        let catalog = skills.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { catalog, loaded: DashMap::new() }
    }

    /// One-line `name: summary` entries for every registered skill,
    /// spliced into the system prompt so the model knows what's available
    /// before loading anything.
    pub fn catalog_listing(&self) -> String {
        let mut names: Vec<&String> = self.catalog.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| format!("- {name}: {}", self.catalog[name].summary))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn is_loaded(&self, thread_id: &str, name: &str) -> bool {
        self.loaded.get(thread_id).map(|set| set.contains(name)).unwrap_or(false)
    }

    fn mark_loaded(&self, thread_id: &str, name: &str) {
        self.loaded.entry(thread_id.to_string()).or_default().insert(name.to_string());
    }
}

#[derive(Deserialize)]
struct LoadSkillArgs {
    name: String,
}

#[async_trait]
impl Middleware for SkillMiddleware {
    fn name(&self) -> &str {
        "skill"
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "load_skill".to_string(),
            description: "Load a skill's full instructions by name. Call before using a skill's capabilities.".to_string(),
            parameters: serde_json::json!({"type":"object","properties":{"name":{"type":"string"}},"required":["name"]}),
        }]
    }

    async fn before_agent(&self, ctx: &mut AgentContext) -> Result<()> {
        if !self.catalog.is_empty() {
            ctx.system_fragments.push(format!("Available skills (call load_skill to use one):\n{}", self.catalog_listing()));
        }
        if let Some(names) = self.loaded.get(&ctx.thread_id) {
            for name in names.iter() {
                if let Some(skill) = self.catalog.get(name) {
                    ctx.system_fragments.push(skill.body.clone());
                }
            }
        }
        Ok(())
    }

    async fn wrap_tool_call(&self, ctx: &AgentContext, call: ToolCall, next: &dyn ToolCaller) -> Result<ToolResult> {
        match call.name.as_str() {
            "load_skill" => {
                let args: LoadSkillArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| MiddlewareError::invalid_input(e.to_string(), "pass {\"name\": \"...\"}"))?;
                match self.catalog.get(&args.name) {
                    Some(skill) => {
                        if self.is_loaded(&ctx.thread_id, &args.name) {
                            Ok(ToolResult::ok(call.id, format!("{} is already loaded", args.name)))
                        } else {
                            self.mark_loaded(&ctx.thread_id, &args.name);
                            Ok(ToolResult::ok(call.id, format!("loaded {}\n{}", skill.name, skill.body)))
                        }
                    }
                    None => Ok(ToolResult::error(call.id, format!("no such skill: {}", args.name))),
                }
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

    fn middleware() -> SkillMiddleware {
        SkillMiddleware::new(vec![SkillDefinition {
            name: "pdf-extract".to_string(),
            summary: "extract text from PDFs".to_string(),
            body: "Full pdf-extract instructions...".to_string(),
        }])
    }

    #[tokio::test]
    async fn loading_unknown_skill_returns_error_result() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "load_skill".into(), arguments: serde_json::json!({"name": "nope"}) };
        let result = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn loaded_skill_persists_into_before_agent_fragments() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "load_skill".into(), arguments: serde_json::json!({"name": "pdf-extract"}) };
        mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();

        let mut ctx2 = AgentContext::new("t1", "r2");
        mw.before_agent(&mut ctx2).await.unwrap();
        assert!(ctx2.system_fragments.iter().any(|f| f.contains("Full pdf-extract instructions")));
    }

    #[tokio::test]
    async fn reloading_already_loaded_skill_is_a_no_op_message() {
        let mw = middleware();
        let ctx = AgentContext::new("t1", "r1");
        let call = ToolCall { id: "1".into(), name: "load_skill".into(), arguments: serde_json::json!({"name": "pdf-extract"}) };
        mw.wrap_tool_call(&ctx, call.clone(), &Unreachable).await.unwrap();
        let second = mw.wrap_tool_call(&ctx, call, &Unreachable).await.unwrap();
        assert!(second.content.contains("already loaded"));
    }
}
