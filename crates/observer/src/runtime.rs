//! `AgentRuntime`: composes the four monitors into the
//! `agentcore_middleware::ObserverSink` that `MonitorMiddleware` emits to.
//! Owns monitors only — calling the LLM belongs to
//! `agentcore-scheduler::RunExecutor`.

use agentcore_middleware::{ObserverSink, TokenUsage};
use serde::Serialize;
use tracing::debug;

use crate::context_monitor::{ContextMonitor, ContextSnapshot};
use crate::cost_calculator::CostCalculator;
use crate::state_monitor::{AgentState, StateMonitor};
use crate::token_monitor::TokenMonitor;

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub thread_id: String,
    pub state: AgentState,
    pub tokens: TokenUsage,
    pub tokens_total: u64,
    pub cost_usd: f64,
    pub context: Option<ContextSnapshot>,
}

pub struct AgentRuntime {
    tokens: TokenMonitor,
    cost: CostCalculator,
    context: ContextMonitor,
    state: StateMonitor,
}

impl AgentRuntime {
    pub fn new(context_limit: u64, cost: CostCalculator) -> Self {
        Self { tokens: TokenMonitor::new(), cost, context: ContextMonitor::new(context_limit), state: StateMonitor::new() }
    }

    pub fn set_state(&self, thread_id: &str, state: AgentState) {
        self.state.set_state(thread_id, state);
    }

    pub fn observe_context(&self, thread_id: &str, message_count: u64, token_estimate: u64) -> ContextSnapshot {
        self.context.observe(thread_id, message_count, token_estimate)
    }

    /// The current snapshot surfaced as `RunEvent::Status` by the
    /// scheduler, and via `GET /api/threads/{id}/runtime`.
    pub fn status(&self, thread_id: &str, model: &str) -> RuntimeStatus {
        let tokens = self.tokens.thread_usage(thread_id);
        let cost_usd = self.cost.cost(model, &tokens).map(|b| b.total).unwrap_or(0.0);
        RuntimeStatus {
            thread_id: thread_id.to_string(),
            state: self.state.state_of(thread_id),
            tokens_total: tokens.total(),
            tokens,
            cost_usd,
            context: self.context.snapshot(thread_id),
        }
    }
}

impl ObserverSink for AgentRuntime {
    fn record_turn(&self, thread_id: &str, model: &str, usage: &TokenUsage, stop_reason: &str) {
        self.tokens.record(thread_id, usage);
        let state = if stop_reason == "tool_use" { AgentState::Tool } else { AgentState::Streaming };
        self.state.set_state(thread_id, state);
        debug!(thread_id, model, tokens = usage.total(), stop_reason, "recorded model turn");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_calculator::PriceTable;

    #[test]
    fn record_turn_feeds_both_token_and_state_monitors() {
        let mut cost = CostCalculator::new();
        cost.register("m", PriceTable { input_per_million: 1.0, output_per_million: 2.0, ..Default::default() });
        let runtime = AgentRuntime::new(1_000, cost);

        runtime.record_turn("t1", "m", &TokenUsage { input: 1_000_000, output: 500_000, reasoning: 0, cache_read: 0, cache_creation: 0 }, "tool_use");

        let status = runtime.status("t1", "m");
        assert_eq!(status.state, AgentState::Tool);
        assert_eq!(status.tokens_total, 1_500_000);
        assert_eq!(status.cost_usd, 2.0);
    }

    #[test]
    fn unresolvable_model_prices_at_zero_instead_of_failing() {
        let runtime = AgentRuntime::new(1_000, CostCalculator::new());
        runtime.record_turn("t1", "mystery-model", &TokenUsage { input: 10, output: 10, reasoning: 0, cache_read: 0, cache_creation: 0 }, "end_turn");
        let status = runtime.status("t1", "mystery-model");
        assert_eq!(status.cost_usd, 0.0);
        assert_eq!(status.state, AgentState::Streaming);
    }

    #[test]
    fn context_snapshot_is_none_until_observed() {
        let runtime = AgentRuntime::new(1_000, CostCalculator::new());
        assert!(runtime.status("t1", "m").context.is_none());
        runtime.observe_context("t1", 3, 50);
        assert!(runtime.status("t1", "m").context.is_some());
    }
}
