use std::sync::Arc;

use agentcore_core::config::AgentCoreConfig;
use agentcore_queue::QueueManager;
use agentcore_sandbox::SandboxManager;
use agentcore_scheduler::RunExecutor;
use agentcore_store::Store;
use axum::{
    routing::{delete, get, post},
    Router,
};
use dashmap::DashMap;

/// Central shared state, passed as `Arc<AppState>` to every handler — one
/// field per subsystem the HTTP layer fronts, wrapped for the concurrency
/// each one actually needs: `DashMap`s for per-thread maps, `Arc` for the
/// subsystems themselves since they already manage their own interior
/// mutability.
pub struct AppState {
    pub config: AgentCoreConfig,
    pub store: Arc<Store>,
    pub sandbox: Arc<SandboxManager>,
    pub queue: Arc<QueueManager>,
    pub executor: Arc<RunExecutor>,
    /// Most recent `run_id` started on each thread — `GET .../runs/stream`
    /// has no other way to know which run a bare `after=<seq>` refers to.
    pub last_run_id: DashMap<String, String>,
}

impl AppState {
    pub fn new(config: AgentCoreConfig, store: Arc<Store>, sandbox: Arc<SandboxManager>, queue: Arc<QueueManager>, executor: Arc<RunExecutor>) -> Self {
        Self { config, store, sandbox, queue, executor, last_run_id: DashMap::new() }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/threads", get(crate::http::threads::list_threads).post(crate::http::threads::create_thread))
        .route(
            "/api/threads/{id}",
            get(crate::http::threads::get_thread).delete(crate::http::threads::delete_thread),
        )
        .route("/api/threads/{id}/runs", post(crate::http::runs::start_run))
        .route("/api/threads/{id}/runs/cancel", post(crate::http::runs::cancel_run))
        .route("/api/threads/{id}/runs/stream", get(crate::http::runs::stream_run))
        .route("/api/threads/{id}/steer", post(crate::http::queue::steer))
        .route("/api/threads/{id}/queue-mode", post(crate::http::queue::set_queue_mode))
        .route("/api/threads/{id}/queue/flush", post(crate::http::queue::flush))
        .route("/api/threads/{id}/sandbox/pause", get(crate::http::sandbox::pause).post(crate::http::sandbox::pause))
        .route("/api/threads/{id}/sandbox/resume", get(crate::http::sandbox::resume).post(crate::http::sandbox::resume))
        .route("/api/threads/{id}/sandbox", delete(crate::http::sandbox::destroy))
        .route("/api/threads/{id}/session", get(crate::http::status::session_status))
        .route("/api/threads/{id}/terminal", get(crate::http::status::terminal_status))
        .route("/api/threads/{id}/lease", get(crate::http::status::lease_status))
        .route("/api/threads/{id}/runtime", get(crate::http::status::runtime_status))
        .route("/api/sandbox/types", get(crate::http::sandbox::types))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
