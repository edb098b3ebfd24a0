//! End-to-end run scheduler scenarios, using `MockProvider` and an
//! in-process scripted model so no network access is required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use std::sync::Mutex;

use agentcore_core::types::QueueMode;
use agentcore_middleware::{
    FileSystemMiddleware, MiddlewareStack, ModelCaller, ModelRequest, ModelResponse, ModelToolCall, MonitorMiddleware,
    QueueMiddleware, TaskMiddleware, TokenUsage, TodoMiddleware,
};
use agentcore_observer::{AgentRuntime, CostCalculator};
use agentcore_queue::QueueManager;
use agentcore_sandbox::mock_provider::MockProvider;
use agentcore_scheduler::{RunEvent, RunExecutor, RunState, SchedulerSubAgentSpawner};

struct ScriptedModel {
    turn: AtomicUsize,
}

#[async_trait::async_trait]
impl ModelCaller for ScriptedModel {
    async fn call(&self, _request: ModelRequest) -> agentcore_middleware::Result<ModelResponse> {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst);
        match turn {
            0 => Ok(ModelResponse {
                content: String::new(),
                tool_calls: vec![ModelToolCall {
                    id: "call-1".to_string(),
                    name: "write_file".to_string(),
                    arguments: serde_json::json!({"path": "/workspace/notes.txt", "content": "hello world"}),
                }],
                usage: TokenUsage::default(),
                stop_reason: "tool_use".to_string(),
            }),
            1 => Ok(ModelResponse {
                content: String::new(),
                tool_calls: vec![ModelToolCall {
                    id: "call-2".to_string(),
                    name: "read_file".to_string(),
                    arguments: serde_json::json!({"path": "/workspace/notes.txt"}),
                }],
                usage: TokenUsage::default(),
                stop_reason: "tool_use".to_string(),
            }),
            _ => Ok(ModelResponse {
                content: "the file says: hello world".to_string(),
                tool_calls: vec![],
                usage: TokenUsage { input: 100, output: 20, reasoning: 0, cache_read: 0, cache_creation: 0 },
                stop_reason: "end_turn".to_string(),
            }),
        }
    }
}

fn build_executor() -> (Arc<RunExecutor>, Arc<QueueManager>) {
    let provider = Arc::new(MockProvider::new());
    let runtime = Arc::new(AgentRuntime::new(100_000, CostCalculator::with_default_pricing()));
    let mut stack = MiddlewareStack::new();
    stack.push(Arc::new(MonitorMiddleware::new(runtime.clone())));
    stack.push(Arc::new(FileSystemMiddleware::new(provider, "inst-1", "/workspace")));
    stack.push(Arc::new(TodoMiddleware::new()));

    let queue = Arc::new(QueueManager::new());
    let model = Arc::new(ScriptedModel { turn: AtomicUsize::new(0) });
    let executor = Arc::new(RunExecutor::with_runtime(Arc::new(stack), queue.clone(), model, runtime));
    (executor, queue)
}

#[tokio::test]
async fn full_turn_with_two_tool_calls_then_completion() {
    let (executor, _queue) = build_executor();
    let mut rx = executor.start_run("t1".to_string(), "claude-sonnet-4-6".to_string(), "write then read back notes.txt".to_string()).unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(RunEvent::Started { .. })));
    assert!(matches!(events.last(), Some(RunEvent::Done { .. })));

    let tool_calls: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::ToolCall { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tool_calls, vec!["write_file", "read_file"]);

    let final_text = events.iter().find_map(|e| match e {
        RunEvent::TextDelta { text, .. } => Some(text.clone()),
        _ => None,
    });
    assert_eq!(final_text.as_deref(), Some("the file says: hello world"));

    // sequence numbers are strictly monotonic within the run
    let seqs: Vec<u64> = events.iter().map(|e| e.seq()).collect();
    for pair in seqs.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    // every tool_call precedes its paired tool_result
    for call_id in ["call-1", "call-2"] {
        let call_idx = events
            .iter()
            .position(|e| matches!(e, RunEvent::ToolCall { tool_call_id, .. } if tool_call_id == call_id))
            .unwrap();
        let result_idx = events
            .iter()
            .position(|e| matches!(e, RunEvent::ToolResult { tool_call_id, .. } if tool_call_id == call_id))
            .unwrap();
        assert!(call_idx < result_idx);
    }

    assert_eq!(executor.state_of("t1"), RunState::Idle);

    // a status event follows each model response, and the final one reflects
    // the only turn that reported real usage
    let statuses: Vec<&RunEvent> = events.iter().filter(|e| matches!(e, RunEvent::Status { .. })).collect();
    assert_eq!(statuses.len(), 3);
    assert!(matches!(statuses.last(), Some(RunEvent::Status { tokens_total: 120, .. })));
    assert_eq!(executor.runtime().status("t1", "claude-sonnet-4-6").tokens_total, 120);
}

/// Turn script for the sub-agent scenario: the parent's first turn asks for
/// the `task` tool, the sub-run's single turn answers in plain text, and the
/// parent's closing turn wraps up.
struct TaskScript {
    turn: AtomicUsize,
}

#[async_trait::async_trait]
impl ModelCaller for TaskScript {
    async fn call(&self, _request: ModelRequest) -> agentcore_middleware::Result<ModelResponse> {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst);
        match turn {
            0 => Ok(ModelResponse {
                content: String::new(),
                tool_calls: vec![ModelToolCall {
                    id: "call-task".to_string(),
                    name: "task".to_string(),
                    arguments: serde_json::json!({"subagent_type": "helper", "prompt": "summarize the logs"}),
                }],
                usage: TokenUsage::default(),
                stop_reason: "tool_use".to_string(),
            }),
            1 => Ok(ModelResponse {
                content: "sub-agent findings".to_string(),
                tool_calls: vec![],
                usage: TokenUsage::default(),
                stop_reason: "end_turn".to_string(),
            }),
            _ => Ok(ModelResponse {
                content: "all done".to_string(),
                tool_calls: vec![],
                usage: TokenUsage::default(),
                stop_reason: "end_turn".to_string(),
            }),
        }
    }
}

#[tokio::test]
async fn subagent_events_are_reemitted_into_the_parent_stream() {
    let spawner = Arc::new(SchedulerSubAgentSpawner::new("claude-sonnet-4-6"));
    let mut stack = MiddlewareStack::new();
    stack.push(Arc::new(TaskMiddleware::new(spawner.clone())));

    let queue = Arc::new(QueueManager::new());
    let model = Arc::new(TaskScript { turn: AtomicUsize::new(0) });
    let executor = Arc::new(RunExecutor::new(Arc::new(stack), queue, model));
    spawner.bind(executor.clone());

    let mut rx = executor.start_run("parent".to_string(), "claude-sonnet-4-6".to_string(), "delegate this".to_string()).unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let subagent_events: Vec<&RunEvent> =
        events.iter().filter(|e| matches!(e, RunEvent::SubAgent { .. })).collect();
    assert!(!subagent_events.is_empty());
    for event in &subagent_events {
        let RunEvent::SubAgent { parent_tool_call_id, .. } = event else { unreachable!() };
        assert_eq!(parent_tool_call_id, "call-task");
    }

    // sub-agent interleaving must not break per-run sequence monotonicity
    let seqs: Vec<u64> = events.iter().map(|e| e.seq()).collect();
    for pair in seqs.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    // the task tool's result carries the sub-run's final text
    let task_result = events.iter().find_map(|e| match e {
        RunEvent::ToolResult { tool_call_id, content, .. } if tool_call_id == "call-task" => Some(content.clone()),
        _ => None,
    });
    assert_eq!(task_result.as_deref(), Some("sub-agent findings"));
    assert!(matches!(events.last(), Some(RunEvent::Done { .. })));
}

#[tokio::test]
async fn second_run_on_same_thread_is_rejected_while_first_is_active() {
    let (executor, _queue) = build_executor();
    let _rx = executor.start_run("t1".to_string(), "claude-sonnet-4-6".to_string(), "go".to_string()).unwrap();

    // the first run is mid-flight (state flips to Idle only once drained);
    // a second start on the same thread must be rejected.
    let second = executor.start_run("t1".to_string(), "claude-sonnet-4-6".to_string(), "go again".to_string());
    assert!(second.is_err());
}

/// Captures the message list each model call actually sees.
struct CapturingModel {
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait::async_trait]
impl ModelCaller for CapturingModel {
    async fn call(&self, request: ModelRequest) -> agentcore_middleware::Result<ModelResponse> {
        self.seen.lock().unwrap().push(request.messages.iter().map(|m| m.content.clone()).collect());
        Ok(ModelResponse { content: "ok".to_string(), tool_calls: vec![], usage: TokenUsage::default(), stop_reason: "end_turn".to_string() })
    }
}

#[tokio::test]
async fn queued_steer_is_injected_at_the_next_safe_point() {
    let queue = Arc::new(QueueManager::new());
    queue.set_mode("t-steer", QueueMode::Steer);
    queue.enqueue("t-steer", "actually stop and check the logs");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut stack = MiddlewareStack::new();
    stack.push(Arc::new(QueueMiddleware::new(queue.clone())));
    let executor = Arc::new(RunExecutor::new(Arc::new(stack), queue, Arc::new(CapturingModel { seen: seen.clone() })));

    let mut rx = executor.start_run("t-steer".to_string(), "m".to_string(), "original task".to_string()).unwrap();
    while rx.recv().await.is_some() {}

    let calls = seen.lock().unwrap();
    let first_call = &calls[0];
    assert!(first_call.iter().any(|c| c == "original task"));
    assert!(first_call.iter().any(|c| c.contains("[steer] actually stop and check the logs")));
}

#[tokio::test]
async fn cancelling_an_active_run_emits_cancelled_and_returns_to_idle() {
    let (executor, _queue) = build_executor();
    let mut rx = executor.start_run("t2".to_string(), "claude-sonnet-4-6".to_string(), "go".to_string()).unwrap();
    executor.cancel("t2");

    let mut saw_cancelled = false;
    while let Some(event) = rx.recv().await {
        if matches!(event, RunEvent::Cancelled { .. }) {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled || executor.state_of("t2") == RunState::Idle);
}

#[tokio::test]
async fn empty_conversation_with_immediate_completion_reports_idle() {
    let provider = Arc::new(MockProvider::new());
    let mut stack = MiddlewareStack::new();
    stack.push(Arc::new(FileSystemMiddleware::new(provider, "inst-1", "/workspace")));
    let queue = Arc::new(QueueManager::new());

    struct ImmediateDone;
    #[async_trait::async_trait]
    impl ModelCaller for ImmediateDone {
        async fn call(&self, _request: ModelRequest) -> agentcore_middleware::Result<ModelResponse> {
            Ok(ModelResponse { content: "hi".to_string(), tool_calls: vec![], usage: TokenUsage::default(), stop_reason: "end_turn".to_string() })
        }
    }

    let executor = Arc::new(RunExecutor::new(Arc::new(stack), queue, Arc::new(ImmediateDone)));
    let mut rx = executor.start_run("t3".to_string(), "m".to_string(), "hello".to_string()).unwrap();
    let mut events = Vec::new();
    while let Some(e) = rx.recv().await {
        events.push(e);
    }
    assert!(matches!(events.last(), Some(RunEvent::Done { .. })));
    assert_eq!(executor.state_of("t3"), RunState::Idle);
}

