//! `ContextMonitor`: tracks message count and an estimated
//! token count per thread, flagging `near_limit` at 0.9x `context_limit`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub message_count: u64,
    pub token_estimate: u64,
    pub context_limit: u64,
    pub near_limit: bool,
}

struct ThreadCounters {
    message_count: AtomicU64,
    token_estimate: AtomicU64,
}

pub struct ContextMonitor {
    context_limit: u64,
    per_thread: DashMap<String, ThreadCounters>,
}

impl ContextMonitor {
    pub fn new(context_limit: u64) -> Self {
        Self { context_limit, per_thread: DashMap::new() }
    }

    pub fn observe(&self, thread_id: &str, message_count: u64, token_estimate: u64) -> ContextSnapshot {
        let entry = self.per_thread.entry(thread_id.to_string()).or_insert_with(|| ThreadCounters { message_count: AtomicU64::new(0), token_estimate: AtomicU64::new(0) });
        entry.message_count.store(message_count, Ordering::Relaxed);
        entry.token_estimate.store(token_estimate, Ordering::Relaxed);
        self.snapshot_from(message_count, token_estimate)
    }

    pub fn snapshot(&self, thread_id: &str) -> Option<ContextSnapshot> {
        self.per_thread.get(thread_id).map(|c| self.snapshot_from(c.message_count.load(Ordering::Relaxed), c.token_estimate.load(Ordering::Relaxed)))
    }

    fn snapshot_from(&self, message_count: u64, token_estimate: u64) -> ContextSnapshot {
        let near_limit = token_estimate as f64 >= 0.9 * self.context_limit as f64;
        ContextSnapshot { message_count, token_estimate, context_limit: self.context_limit, near_limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_near_limit_at_the_ninety_percent_threshold() {
        let monitor = ContextMonitor::new(1_000);
        let below = monitor.observe("t1", 10, 899);
        assert!(!below.near_limit);
        let at = monitor.observe("t1", 11, 900);
        assert!(at.near_limit);
    }

    #[test]
    fn snapshot_reflects_the_most_recent_observation() {
        let monitor = ContextMonitor::new(1_000);
        monitor.observe("t1", 5, 100);
        monitor.observe("t1", 8, 200);
        let snap = monitor.snapshot("t1").unwrap();
        assert_eq!(snap.message_count, 8);
        assert_eq!(snap.token_estimate, 200);
    }

    #[test]
    fn unobserved_thread_has_no_snapshot() {
        let monitor = ContextMonitor::new(1_000);
        assert!(monitor.snapshot("nope").is_none());
    }
}
