use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use agentcore_sandbox::ChatSession;

use crate::app::AppState;
use crate::http::{engine_error_response, not_found, ApiError};

async fn load_session(state: &AppState, thread_id: &str) -> Result<ChatSession, (StatusCode, Json<ApiError>)> {
    let row = state
        .store
        .get_chat_session_by_thread(thread_id)
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| not_found(format!("thread {thread_id} has no sandbox session")))?;
    ChatSession::from_row(&row).map_err(|e| engine_error_response(e.into()))
}

/// `GET|POST /api/threads/{id}/sandbox/pause`.
pub async fn pause(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let mut session = load_session(&state, &id).await?;
    session.pause(&state.store, Utc::now()).await.map_err(|e| engine_error_response(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET|POST /api/threads/{id}/sandbox/resume`.
pub async fn resume(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let mut session = load_session(&state, &id).await?;
    session.resume(&state.store, Utc::now()).await.map_err(|e| engine_error_response(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/threads/{id}/sandbox`. Releases the runtime but
/// leaves the lease intact, per `ChatSession::close`'s documented contract.
pub async fn destroy(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let mut session = load_session(&state, &id).await?;
    session.close(&state.store, Utc::now()).await.map_err(|e| engine_error_response(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/sandbox/types`.
pub async fn types(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "types": state.sandbox.sandbox_types() }))
}
