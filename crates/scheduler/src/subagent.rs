//! Wires `agentcore_middleware::TaskMiddleware`'s `SubAgentSpawner` trait
//! onto `RunExecutor` itself: a sub-agent is just another run, on a
//! synthetic per-call thread id, whose final text is collected and handed
//! back as the `task` tool's result. The sub-run gets the same middleware
//! stack and isolation as a top-level run.

use std::sync::{Arc, OnceLock};

use agentcore_middleware::SubAgentSpawner;
use async_trait::async_trait;
use uuid::Uuid;

use crate::executor::RunExecutor;
use crate::types::RunEvent;

/// The spawner and the executor it spawns sub-runs through are mutually
/// referential: `RunExecutor` is built with a `TaskMiddleware` that holds
/// this spawner, so the spawner can't be born already holding the
/// `Arc<RunExecutor>` it needs. `bind` closes the loop once the executor
/// exists.
pub struct SchedulerSubAgentSpawner {
    executor: OnceLock<Arc<RunExecutor>>,
    default_model: String,
}

impl SchedulerSubAgentSpawner {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self { executor: OnceLock::new(), default_model: default_model.into() }
    }

    /// Completes construction — called once, immediately after the
    /// `RunExecutor` this spawner was handed to is built.
    pub fn bind(&self, executor: Arc<RunExecutor>) {
        let _ = self.executor.set(executor);
    }
}

#[async_trait]
impl SubAgentSpawner for SchedulerSubAgentSpawner {
    async fn spawn(
        &self,
        parent_thread_id: &str,
        parent_tool_call_id: &str,
        subagent_type: &str,
        prompt: &str,
    ) -> std::result::Result<String, String> {
        let executor = self.executor.get().expect("SchedulerSubAgentSpawner::bind was not called").clone();
        let sub_thread_id = format!("{parent_thread_id}/subagent/{subagent_type}/{}", Uuid::new_v4());
        let mut rx = executor
            .start_run(sub_thread_id, self.default_model.clone(), prompt.to_string())
            .map_err(|e| e.to_string())?;

        let mut output = String::new();
        while let Some(event) = rx.recv().await {
            executor.forward_subagent_event(parent_thread_id, parent_tool_call_id, event.clone()).await;
            match event {
                RunEvent::TextDelta { text, .. } => output.push_str(&text),
                RunEvent::Done { .. } => return Ok(output),
                RunEvent::Failed { message, .. } => return Err(message),
                RunEvent::Cancelled { .. } => return Err("sub-agent cancelled".to_string()),
                _ => {}
            }
        }
        Ok(output)
    }
}
