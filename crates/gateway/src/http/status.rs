//! `GET /api/threads/{id}/{session,terminal,lease,runtime}`:
//! read-only status snapshots, queried straight from durable storage and
//! the live `AgentRuntime` rather than through the heavier `SandboxManager`
//! handles those rows back — none of these routes mutate anything.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::{engine_error_response, not_found, ApiError};

pub async fn session_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let session = state
        .store
        .get_chat_session_by_thread(&id)
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| not_found(format!("thread {id} not found")))?;
    Ok(Json(json!({
        "session_id": session.session_id,
        "status": session.status,
        "created_at": session.created_at,
        "last_active_at": session.last_active_at,
    })))
}

pub async fn terminal_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let terminal = state
        .store
        .get_terminal_by_thread(&id)
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| not_found(format!("thread {id} has no terminal")))?;
    Ok(Json(json!({
        "terminal_id": terminal.terminal_id,
        "lease_id": terminal.lease_id,
        "version": terminal.version,
        "state": serde_json::from_str::<Value>(&terminal.state_json).unwrap_or(Value::Null),
    })))
}

pub async fn lease_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let terminal = state
        .store
        .get_terminal_by_thread(&id)
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| not_found(format!("thread {id} has no terminal")))?;
    let lease = state
        .store
        .get_lease(&terminal.lease_id)
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| not_found(format!("lease {} not found", terminal.lease_id)))?;
    Ok(Json(json!({
        "lease_id": lease.lease_id,
        "provider_name": lease.provider_name,
        "instance": lease.instance_json.map(|j| serde_json::from_str::<Value>(&j).unwrap_or(Value::Null)),
    })))
}

/// `GET /api/threads/{id}/runtime` — current token/cost/context/state
/// snapshot from the shared `AgentRuntime`.
pub async fn runtime_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<Value> {
    let model = state.config.agent.resolved_model().unwrap_or_else(|_| state.config.agent.model.clone());
    let status = state.executor.runtime().status(&id, &model);
    Json(serde_json::to_value(status).unwrap_or(Value::Null))
}
