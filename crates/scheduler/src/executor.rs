//! Run scheduler: drives the model-call/tool-call loop through
//! `agentcore_middleware::MiddlewareStack`, dispatching the tool calls
//! within one turn in bounded parallel — a `tokio::task::JoinSet` over a
//! `tokio::sync::Semaphore`-bounded set of tasks, drained as each task
//! finishes, with causality preserved by `tool_call_id`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentcore_core::config::{DEFAULT_CONTEXT_LIMIT, DEFAULT_MAX_CONCURRENT_TOOLS};
use agentcore_core::error::EngineError;
use agentcore_middleware::{AgentContext, MiddlewareStack, ModelCaller, ModelRequest, ToolCall, ToolCaller, ToolResult};
use agentcore_observer::{AgentRuntime, AgentState, CostCalculator};
use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, SchedulerError};
use crate::retry::retry_transient;
use crate::types::{RunEvent, RunState};

/// Terminal `ToolCaller` at the bottom of the middleware chain: every tool
/// the scheduler supports is handled by a standard middleware, so reaching
/// here means the model named a tool nothing recognizes.
pub struct UnknownToolTerminal;

#[async_trait::async_trait]
impl ToolCaller for UnknownToolTerminal {
    async fn call(&self, call: ToolCall) -> agentcore_middleware::Result<ToolResult> {
        Err(agentcore_middleware::MiddlewareError::UnknownTool(call.name))
    }
}

struct RunBookkeeping {
    state: RunState,
    cancel: CancellationToken,
    run_id: String,
    tx: mpsc::Sender<RunEvent>,
}

/// Owns the per-thread "at most one active run" invariant and dispatches
/// admitted messages through the state machine.
pub struct RunExecutor {
    middleware: Arc<MiddlewareStack>,
    queue: Arc<agentcore_queue::QueueManager>,
    model: Arc<dyn ModelCaller>,
    tool_terminal: Arc<dyn ToolCaller>,
    tool_semaphore: Arc<Semaphore>,
    runs: DashMap<String, RunBookkeeping>,
    seq: DashMap<String, AtomicU64>,
    runtime: Arc<AgentRuntime>,
}

impl RunExecutor {
    pub fn new(middleware: Arc<MiddlewareStack>, queue: Arc<agentcore_queue::QueueManager>, model: Arc<dyn ModelCaller>) -> Self {
        let runtime = Arc::new(AgentRuntime::new(DEFAULT_CONTEXT_LIMIT, CostCalculator::with_default_pricing()));
        Self::with_runtime(middleware, queue, model, runtime)
    }

    /// Same as [`RunExecutor::new`] but shares an already-constructed
    /// `AgentRuntime` — used when the gateway wants one runtime
    /// instance backing both `RunEvent::Status` emission and the
    /// `GET /api/threads/{id}/runtime` snapshot endpoint.
    pub fn with_runtime(middleware: Arc<MiddlewareStack>, queue: Arc<agentcore_queue::QueueManager>, model: Arc<dyn ModelCaller>, runtime: Arc<AgentRuntime>) -> Self {
        Self {
            middleware,
            queue,
            model,
            tool_terminal: Arc::new(UnknownToolTerminal),
            tool_semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_TOOLS)),
            runs: DashMap::new(),
            seq: DashMap::new(),
            runtime,
        }
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    pub fn state_of(&self, thread_id: &str) -> RunState {
        self.runs.get(thread_id).map(|r| r.state).unwrap_or(RunState::Idle)
    }

    /// Best-effort external cancel: flips to `cancelling`,
    /// signals the cancellation token, lets in-flight tool calls race to
    /// completion — their results are discarded by the caller once this
    /// returns.
    pub fn cancel(&self, thread_id: &str) {
        if let Some(r) = self.runs.get(thread_id) {
            r.cancel.cancel();
        }
    }

    fn next_seq(&self, run_id: &str) -> u64 {
        self.seq.entry(run_id.to_string()).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::SeqCst)
    }

    /// Re-emits a sub-run's event into its parent run's stream, wrapped as
    /// `RunEvent::SubAgent` and stamped with the parent's own next sequence
    /// number so interleaved sub-agent events keep the per-run ordering
    /// guarantee.
    pub async fn forward_subagent_event(&self, parent_thread_id: &str, parent_tool_call_id: &str, inner: RunEvent) {
        let Some((run_id, tx)) = self.runs.get(parent_thread_id).map(|r| (r.run_id.clone(), r.tx.clone())) else {
            return;
        };
        let seq = self.next_seq(&run_id);
        let _ = tx
            .send(RunEvent::SubAgent {
                run_id,
                seq,
                parent_tool_call_id: parent_tool_call_id.to_string(),
                inner: Box::new(inner),
            })
            .await;
    }

    fn set_state(&self, thread_id: &str, state: RunState) {
        if let Some(mut r) = self.runs.get_mut(thread_id) {
            r.state = state;
        }
    }

    /// Admits `message` on `thread_id` and drives the run to completion,
    /// streaming `RunEvent`s to the returned channel. Returns
    /// `RunNotIdle` without admitting anything if a run is already active
    /// on this thread — a new run cannot start until the previous one
    /// reaches idle.
    pub fn start_run(self: &Arc<Self>, thread_id: String, model: String, message: String) -> Result<mpsc::Receiver<RunEvent>> {
        if self.state_of(&thread_id) != RunState::Idle {
            return Err(SchedulerError::RunNotIdle { thread_id: thread_id.clone(), state: self.state_of(&thread_id).to_string() });
        }

        let run_id = agentcore_core::types::RunId::new().to_string();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(256);
        self.runs.insert(
            thread_id.clone(),
            RunBookkeeping { state: RunState::Streaming, cancel: cancel.clone(), run_id: run_id.clone(), tx: tx.clone() },
        );
        let this = self.clone();
        tokio::spawn(async move {
            this.drive_run(thread_id, run_id, model, message, cancel, tx).await;
        });

        Ok(rx)
    }

    async fn drive_run(
        self: Arc<Self>,
        thread_id: String,
        run_id: String,
        model: String,
        message: String,
        cancel: CancellationToken,
        tx: mpsc::Sender<RunEvent>,
    ) {
        let seq = self.next_seq(&run_id);
        let _ = tx.send(RunEvent::Started { run_id: run_id.clone(), seq }).await;

        let mut ctx = AgentContext::new(thread_id.clone(), run_id.clone());
        if let Err(e) = self.middleware.run_before_agent(&mut ctx).await {
            self.fail_run(&thread_id, &run_id, e.into(), &tx).await;
            return;
        }

        let mut pending: Vec<agentcore_middleware::ChatMessage> =
            vec![agentcore_middleware::ChatMessage::new(agentcore_middleware::Role::User, message)];

        loop {
            if cancel.is_cancelled() {
                self.cancel_run(&thread_id, &run_id, &tx).await;
                return;
            }

            // Interrupt-queued input preempts whatever this iteration was
            // about to send: the abandoned turn's content is dropped and the
            // loop restarts with the interrupt as the user message
            //.
            let interrupts = self.queue.drain_for_injection(&thread_id, agentcore_queue::DrainPoint::Immediate);
            if !interrupts.is_empty() {
                pending = vec![agentcore_middleware::ChatMessage::new(
                    agentcore_middleware::Role::User,
                    interrupts.join("\n"),
                )];
            }

            let mut request = ModelRequest { model: model.clone(), messages: Vec::new(), tools: self.middleware.all_tool_schemas() };
            for fragment in &ctx.system_fragments {
                request.messages.push(agentcore_middleware::ChatMessage::new(agentcore_middleware::Role::System, fragment.clone()));
            }
            request.messages.append(&mut pending);

            let model_ref = self.model.clone();
            let stack = self.middleware.clone();
            let ctx_ref = &ctx;
            let response = retry_transient("model_call", || {
                let req = request.clone();
                let model_ref = model_ref.clone();
                let stack = stack.clone();
                async move { stack.run_model_call(ctx_ref, req, model_ref.as_ref()).await.map_err(EngineError::from) }
            })
            .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    self.fail_run(&thread_id, &run_id, e, &tx).await;
                    return;
                }
            };

            let seq = self.next_seq(&run_id);
            if !response.content.is_empty() {
                let _ = tx.send(RunEvent::TextDelta { run_id: run_id.clone(), seq, text: response.content.clone() }).await;
            }

            // Usage itself is recorded by MonitorMiddleware on the way out of
            // the model call; here we only observe context pressure and emit
            // the resulting snapshot.
            let estimated_tokens: u64 = request.messages.iter().map(|m| m.content.len() as u64 / 4).sum();
            let context = self.runtime.observe_context(&thread_id, request.messages.len() as u64, estimated_tokens);
            let status = self.runtime.status(&thread_id, &model);
            let status_seq = self.next_seq(&run_id);
            let _ = tx
                .send(RunEvent::Status {
                    run_id: run_id.clone(),
                    seq: status_seq,
                    state: self.state_of(&thread_id),
                    tokens_total: status.tokens_total,
                    cost_usd: format!("{:.6}", status.cost_usd),
                    near_limit: context.near_limit,
                })
                .await;

            if response.tool_calls.is_empty() {
                self.set_state(&thread_id, RunState::Draining);
                if let Some(next_message) = self.drain_queues_on_draining(&thread_id) {
                    self.set_state(&thread_id, RunState::Streaming);
                    pending = vec![agentcore_middleware::ChatMessage::new(agentcore_middleware::Role::User, next_message)];
                    continue;
                }
                break;
            }

            self.set_state(&thread_id, RunState::AwaitingTools);
            for call in &response.tool_calls {
                let seq = self.next_seq(&run_id);
                let _ = tx
                    .send(RunEvent::ToolCall {
                        run_id: run_id.clone(),
                        seq,
                        tool_call_id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await;
            }

            let results = self.dispatch_tools(&ctx, response.tool_calls.clone()).await;
            for (call_id, result) in results {
                let seq = self.next_seq(&run_id);
                // Feed the result back so the next model call sees it.
                let marker = if result.is_error { "tool_error" } else { "tool_result" };
                pending.push(agentcore_middleware::ChatMessage::new(
                    agentcore_middleware::Role::Tool,
                    format!("[{marker} {call_id}]\n{}", result.content),
                ));
                let _ = tx
                    .send(RunEvent::ToolResult {
                        run_id: run_id.clone(),
                        seq,
                        tool_call_id: call_id,
                        content: result.content,
                        is_error: result.is_error,
                    })
                    .await;
            }

            self.set_state(&thread_id, RunState::Streaming);
        }

        if let Err(e) = self.middleware.run_after_agent(&mut ctx).await {
            warn!(thread_id, error = %e, "after_agent hook failed on clean completion");
        }

        let seq = self.next_seq(&run_id);
        let _ = tx.send(RunEvent::Done { run_id: run_id.clone(), seq }).await;
        info!(thread_id, run_id, "run complete");
        self.set_state(&thread_id, RunState::Idle);
        self.runtime.set_state(&thread_id, AgentState::Idle);
        self.runs.remove(&thread_id);
    }

    /// Dispatches every tool call concurrently, bounded by the shared
    /// semaphore. Results are collected in actual completion order — a fast
    /// tool's result is not held back behind a slow one dispatched earlier —
    /// with pairing to the originating call preserved by `tool_call_id`.
    async fn dispatch_tools(&self, ctx: &AgentContext, calls: Vec<agentcore_middleware::ModelToolCall>) -> Vec<(String, ToolResult)> {
        let mut tasks = tokio::task::JoinSet::new();
        for call in calls {
            let stack = self.middleware.clone();
            let sem = self.tool_semaphore.clone();
            let terminal = self.tool_terminal.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore never closed");
                let tool_call = ToolCall { id: call.id.clone(), name: call.name, arguments: call.arguments };
                let result = match stack.run_tool_call(&ctx, tool_call, terminal.as_ref()).await {
                    Ok(r) => r,
                    Err(e) => ToolResult::error(call.id.clone(), e.to_string()),
                };
                (call.id, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => warn!(error = %e, "tool task failed to join"),
            }
        }
        results
    }

    /// Drains `followup` and `collect` at the `draining` state transition
    ///. `steer`/`interrupt` are handled inline at the next safe
    /// point by `agentcore_middleware::QueueMiddleware` during the streaming
    /// loop itself, not here.
    fn drain_queues_on_draining(&self, thread_id: &str) -> Option<String> {
        let drained = self.queue.drain_for_injection(thread_id, agentcore_queue::DrainPoint::RunDraining);
        if drained.is_empty() {
            None
        } else {
            Some(drained.join("\n"))
        }
    }

    async fn fail_run(&self, thread_id: &str, run_id: &str, error: EngineError, tx: &mpsc::Sender<RunEvent>) {
        self.set_state(thread_id, RunState::Failed);
        let seq = self.next_seq(run_id);
        let _ = tx.send(RunEvent::Failed { run_id: run_id.to_string(), seq, message: error.to_string() }).await;
        warn!(thread_id, run_id, error = %error, "run failed");
        self.set_state(thread_id, RunState::Idle);
        self.runtime.set_state(thread_id, AgentState::Idle);
        self.runs.remove(thread_id);
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str, tx: &mpsc::Sender<RunEvent>) {
        self.runtime.set_state(thread_id, AgentState::Cancelling);
        let seq = self.next_seq(run_id);
        let _ = tx.send(RunEvent::Cancelled { run_id: run_id.to_string(), seq }).await;
        info!(thread_id, run_id, "run cancelled");
        self.set_state(thread_id, RunState::Idle);
        self.runtime.set_state(thread_id, AgentState::Idle);
        self.runs.remove(thread_id);
    }
}

