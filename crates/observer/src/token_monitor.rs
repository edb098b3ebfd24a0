//! `TokenMonitor`: aggregates per-response usage into the six
//! standard buckets, per thread and globally.

use std::sync::atomic::{AtomicU64, Ordering};

use agentcore_middleware::TokenUsage;
use dashmap::DashMap;

#[derive(Debug, Default)]
struct Buckets {
    input: AtomicU64,
    output: AtomicU64,
    reasoning: AtomicU64,
    cache_read: AtomicU64,
    cache_creation: AtomicU64,
}

impl Buckets {
    fn add(&self, usage: &TokenUsage) {
        self.input.fetch_add(usage.input, Ordering::Relaxed);
        self.output.fetch_add(usage.output, Ordering::Relaxed);
        self.reasoning.fetch_add(usage.reasoning, Ordering::Relaxed);
        self.cache_read.fetch_add(usage.cache_read, Ordering::Relaxed);
        self.cache_creation.fetch_add(usage.cache_creation, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            input: self.input.load(Ordering::Relaxed),
            output: self.output.load(Ordering::Relaxed),
            reasoning: self.reasoning.load(Ordering::Relaxed),
            cache_read: self.cache_read.load(Ordering::Relaxed),
            cache_creation: self.cache_creation.load(Ordering::Relaxed),
        }
    }
}

/// Normalizes raw provider usage fields into a `TokenUsage`. Some providers
/// fold cached reads into the reported input count; others already exclude
/// them. `cache_inclusive_input` tells the monitor which case it's looking
/// at so it subtracts `cache_read` back out at most once.
pub fn normalize_usage(raw_input: u64, output: u64, reasoning: u64, cache_read: u64, cache_creation: u64, cache_inclusive_input: bool) -> TokenUsage {
    let input = if cache_inclusive_input { raw_input.saturating_sub(cache_read) } else { raw_input };
    TokenUsage { input, output, reasoning, cache_read, cache_creation }
}

pub struct TokenMonitor {
    per_thread: DashMap<String, Buckets>,
    global: Buckets,
}

impl TokenMonitor {
    pub fn new() -> Self {
        Self { per_thread: DashMap::new(), global: Buckets::default() }
    }

    pub fn record(&self, thread_id: &str, usage: &TokenUsage) {
        self.per_thread.entry(thread_id.to_string()).or_default().add(usage);
        self.global.add(usage);
    }

    pub fn thread_usage(&self, thread_id: &str) -> TokenUsage {
        self.per_thread.get(thread_id).map(|b| b.snapshot()).unwrap_or_default()
    }

    pub fn global_usage(&self) -> TokenUsage {
        self.global.snapshot()
    }
}

impl Default for TokenMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_thread_and_globally_across_turns() {
        let monitor = TokenMonitor::new();
        monitor.record("t1", &TokenUsage { input: 10, output: 5, reasoning: 0, cache_read: 0, cache_creation: 0 });
        monitor.record("t1", &TokenUsage { input: 20, output: 8, reasoning: 2, cache_read: 0, cache_creation: 0 });
        monitor.record("t2", &TokenUsage { input: 100, output: 1, reasoning: 0, cache_read: 0, cache_creation: 0 });

        let t1 = monitor.thread_usage("t1");
        assert_eq!(t1.input, 30);
        assert_eq!(t1.output, 13);
        assert_eq!(t1.reasoning, 2);

        let global = monitor.global_usage();
        assert_eq!(global.input, 130);
    }

    #[test]
    fn unknown_thread_reports_zeroed_usage() {
        let monitor = TokenMonitor::new();
        assert_eq!(monitor.thread_usage("nope").total(), 0);
    }

    #[test]
    fn normalize_subtracts_cache_read_only_when_provider_includes_it() {
        let inclusive = normalize_usage(1_000, 50, 0, 200, 0, true);
        assert_eq!(inclusive.input, 800);

        let exclusive = normalize_usage(800, 50, 0, 200, 0, false);
        assert_eq!(exclusive.input, 800);
    }

    #[test]
    fn normalize_saturates_instead_of_underflowing() {
        let usage = normalize_usage(50, 0, 0, 200, 0, true);
        assert_eq!(usage.input, 0);
    }
}
