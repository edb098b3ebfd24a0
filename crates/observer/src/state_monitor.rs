//! `StateMonitor`: tracks the agent's high-level state plus an
//! arbitrary flag map, per thread.

use std::collections::HashMap;

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Streaming,
    Tool,
    Cancelling,
}

pub struct StateMonitor {
    states: DashMap<String, AgentState>,
    flags: DashMap<String, HashMap<String, bool>>,
}

impl StateMonitor {
    pub fn new() -> Self {
        Self { states: DashMap::new(), flags: DashMap::new() }
    }

    pub fn set_state(&self, thread_id: &str, state: AgentState) {
        self.states.insert(thread_id.to_string(), state);
    }

    pub fn state_of(&self, thread_id: &str) -> AgentState {
        self.states.get(thread_id).map(|s| *s).unwrap_or(AgentState::Idle)
    }

    pub fn set_flag(&self, thread_id: &str, flag: &str, value: bool) {
        self.flags.entry(thread_id.to_string()).or_default().insert(flag.to_string(), value);
    }

    pub fn flags(&self, thread_id: &str) -> HashMap<String, bool> {
        self.flags.get(thread_id).map(|f| f.clone()).unwrap_or_default()
    }
}

impl Default for StateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_thread_defaults_to_idle() {
        let monitor = StateMonitor::new();
        assert_eq!(monitor.state_of("nope"), AgentState::Idle);
    }

    #[test]
    fn state_transitions_are_observable_per_thread() {
        let monitor = StateMonitor::new();
        monitor.set_state("t1", AgentState::Streaming);
        monitor.set_state("t2", AgentState::Tool);
        assert_eq!(monitor.state_of("t1"), AgentState::Streaming);
        assert_eq!(monitor.state_of("t2"), AgentState::Tool);
    }

    #[test]
    fn flags_accumulate_independently_of_state() {
        let monitor = StateMonitor::new();
        monitor.set_flag("t1", "awaiting_approval", true);
        monitor.set_flag("t1", "degraded", false);
        let flags = monitor.flags("t1");
        assert_eq!(flags.get("awaiting_approval"), Some(&true));
        assert_eq!(flags.get("degraded"), Some(&false));
    }
}
