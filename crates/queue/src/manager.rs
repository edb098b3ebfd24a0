use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use agentcore_core::types::{QueueMode, QueueTarget};
use chrono::Utc;
use tracing::debug;

use crate::types::{DrainPoint, QueueEntry};

struct PerThreadState {
    mode: QueueMode,
    queues: HashMap<QueueTarget, VecDeque<QueueEntry>>,
}

impl PerThreadState {
    fn new() -> Self {
        let mut queues = HashMap::new();
        for target in [
            QueueTarget::Interrupt,
            QueueTarget::Steer,
            QueueTarget::Followup,
            QueueTarget::Collect,
            QueueTarget::Backlog,
        ] {
            queues.insert(target, VecDeque::new());
        }
        Self { mode: QueueMode::default(), queues }
    }
}

/// Five-queue per-thread inbox with mode-based routing: a `Mutex`-protected
/// map of FIFO queues plus non-blocking mutation methods. Draining blocks
/// only at the scheduler's safe points, never on enqueue.
pub struct QueueManager {
    state: Mutex<HashMap<String, PerThreadState>>,
    seq: AtomicU64,
}

impl QueueManager {
    pub fn new() -> Self {
        Self { state: Mutex::new(HashMap::new()), seq: AtomicU64::new(0) }
    }

    pub fn set_mode(&self, thread_id: &str, mode: QueueMode) {
        let mut guard = self.state.lock().unwrap();
        guard.entry(thread_id.to_string()).or_insert_with(PerThreadState::new).mode = mode;
    }

    pub fn get_mode(&self, thread_id: &str) -> QueueMode {
        let guard = self.state.lock().unwrap();
        guard.get(thread_id).map(|s| s.mode).unwrap_or_default()
    }

    /// Enqueue `content` into the queue(s) selected by the thread's current
    /// `queue_mode`. Non-blocking; returns the assigned (process-wide
    /// monotonic) sequence index.
    pub fn enqueue(&self, thread_id: &str, content: impl Into<String>) -> u64 {
        let content = content.into();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().unwrap();
        let per_thread = guard.entry(thread_id.to_string()).or_insert_with(PerThreadState::new);

        let targets = targets_for_mode(per_thread.mode);
        for target in targets {
            let entry = QueueEntry { seq, content: content.clone(), target, enqueued_at: Utc::now() };
            per_thread.queues.get_mut(&target).unwrap().push_back(entry);
        }
        debug!(thread_id, seq, mode = ?per_thread.mode, "enqueued message");
        seq
    }

    /// Explicitly enqueue into `interrupt`, bypassing the thread's mode —
    /// used by the `/runs/cancel`-adjacent "interrupt now" API surface.
    pub fn enqueue_interrupt(&self, thread_id: &str, content: impl Into<String>) -> u64 {
        self.enqueue_target(thread_id, QueueTarget::Interrupt, content)
    }

    /// Explicitly enqueue into `steer`, regardless of mode — used by
    /// `POST /threads/{id}/steer`.
    pub fn enqueue_steer(&self, thread_id: &str, content: impl Into<String>) -> u64 {
        self.enqueue_target(thread_id, QueueTarget::Steer, content)
    }

    fn enqueue_target(&self, thread_id: &str, target: QueueTarget, content: impl Into<String>) -> u64 {
        let content = content.into();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().unwrap();
        let per_thread = guard.entry(thread_id.to_string()).or_insert_with(PerThreadState::new);
        per_thread.queues.get_mut(&target).unwrap().push_back(QueueEntry {
            seq,
            content,
            target,
            enqueued_at: Utc::now(),
        });
        seq
    }

    /// Drain queues eligible at `drain_point`, returning injectable message
    /// strings in FIFO order. `collect` entries are concatenated into a
    /// single combined message.
    pub fn drain_for_injection(&self, thread_id: &str, drain_point: DrainPoint) -> Vec<String> {
        let mut guard = self.state.lock().unwrap();
        let Some(per_thread) = guard.get_mut(thread_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if matches!(drain_point, DrainPoint::Immediate) {
            out.extend(drain_queue(per_thread, QueueTarget::Interrupt, |c| c));
            return out;
        }

        if matches!(drain_point, DrainPoint::SafePoint) {
            out.extend(drain_queue(per_thread, QueueTarget::Steer, |c| format!("[steer] {c}")));
        }

        if matches!(drain_point, DrainPoint::RunDraining) {
            out.extend(drain_queue(per_thread, QueueTarget::Followup, |c| c));
        }

        if matches!(drain_point, DrainPoint::RunDraining | DrainPoint::ExplicitFlush) {
            let batch: Vec<String> =
                per_thread.queues.get_mut(&QueueTarget::Collect).unwrap().drain(..).map(|e| e.content).collect();
            if !batch.is_empty() {
                out.push(batch.join("\n"));
            }
        }

        if matches!(drain_point, DrainPoint::ExplicitFlush) {
            out.extend(drain_queue(per_thread, QueueTarget::Backlog, |c| c));
        }

        out
    }

    /// Snapshot of pending entry counts per queue, for diagnostics/tests.
    pub fn depths(&self, thread_id: &str) -> HashMap<QueueTarget, usize> {
        let guard = self.state.lock().unwrap();
        guard
            .get(thread_id)
            .map(|s| s.queues.iter().map(|(k, v)| (*k, v.len())).collect())
            .unwrap_or_default()
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

fn drain_queue(per_thread: &mut PerThreadState, target: QueueTarget, format: impl Fn(String) -> String) -> Vec<String> {
    per_thread.queues.get_mut(&target).unwrap().drain(..).map(|e| format(e.content)).collect()
}

fn targets_for_mode(mode: QueueMode) -> Vec<QueueTarget> {
    match mode {
        QueueMode::Interrupt => vec![QueueTarget::Interrupt],
        QueueMode::Steer => vec![QueueTarget::Steer],
        QueueMode::Followup => vec![QueueTarget::Followup],
        QueueMode::Collect => vec![QueueTarget::Collect],
        QueueMode::SteerBacklog => vec![QueueTarget::Steer, QueueTarget::Backlog],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steer_mode_routes_to_steer_queue_and_drains_at_safe_point() {
        let qm = QueueManager::new();
        qm.set_mode("t1", QueueMode::Steer);
        qm.enqueue("t1", "actually stop");

        assert_eq!(qm.drain_for_injection("t1", DrainPoint::RunDraining), Vec::<String>::new());
        let drained = qm.drain_for_injection("t1", DrainPoint::SafePoint);
        assert_eq!(drained, vec!["[steer] actually stop".to_string()]);
    }

    #[test]
    fn steer_backlog_mode_fans_out_to_both_queues() {
        let qm = QueueManager::new();
        qm.set_mode("t1", QueueMode::SteerBacklog);
        qm.enqueue("t1", "note this");

        let depths = qm.depths("t1");
        assert_eq!(depths[&QueueTarget::Steer], 1);
        assert_eq!(depths[&QueueTarget::Backlog], 1);
    }

    #[test]
    fn collect_mode_batches_and_concatenates_on_drain() {
        let qm = QueueManager::new();
        qm.set_mode("t1", QueueMode::Collect);
        qm.enqueue("t1", "first");
        qm.enqueue("t1", "second");

        let drained = qm.drain_for_injection("t1", DrainPoint::RunDraining);
        assert_eq!(drained, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn concurrent_enqueue_preserves_fifo_order() {
        let qm = QueueManager::new();
        qm.set_mode("t1", QueueMode::Followup);
        for i in 0..5 {
            qm.enqueue("t1", format!("msg-{i}"));
        }
        let drained = qm.drain_for_injection("t1", DrainPoint::RunDraining);
        assert_eq!(drained, (0..5).map(|i| format!("msg-{i}")).collect::<Vec<_>>());
    }

    #[test]
    fn interrupt_drains_immediately_regardless_of_mode() {
        let qm = QueueManager::new();
        qm.set_mode("t1", QueueMode::Collect);
        qm.enqueue_interrupt("t1", "stop now");
        let drained = qm.drain_for_injection("t1", DrainPoint::Immediate);
        assert_eq!(drained, vec!["stop now".to_string()]);
    }
}
