use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use agentcore_core::types::QueueMode;
use agentcore_queue::DrainPoint;

use crate::app::AppState;
use crate::http::{bad_request, ApiError};

#[derive(Debug, Deserialize)]
pub struct SteerRequest {
    pub message: String,
}

/// `POST /api/threads/{id}/steer {message}`.
pub async fn steer(State(state): State<Arc<AppState>>, Path(id): Path<String>, Json(req): Json<SteerRequest>) -> Json<Value> {
    let seq = state.queue.enqueue_steer(&id, req.message);
    Json(json!({ "enqueued_seq": seq }))
}

#[derive(Debug, Deserialize)]
pub struct QueueModeRequest {
    pub mode: String,
}

/// `POST /api/threads/{id}/queue/flush` — explicit flush of the deferred
/// `collect`/`backlog` queues. The drained batch is returned to
/// the caller; re-submitting it as a run is the client's decision.
pub async fn flush(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<Value> {
    let drained = state.queue.drain_for_injection(&id, DrainPoint::ExplicitFlush);
    Json(json!({ "messages": drained }))
}

/// `POST /api/threads/{id}/queue-mode {mode}`.
pub async fn set_queue_mode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<QueueModeRequest>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let mode = QueueMode::from_str(&req.mode).map_err(bad_request)?;
    state.queue.set_mode(&id, mode);
    Ok(StatusCode::NO_CONTENT)
}
