use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::{not_found, ApiError};

#[derive(Debug, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub preview: String,
    pub updated_at: String,
    pub sandbox_info: Value,
}

/// `GET /api/threads`.
pub async fn list_threads(State(state): State<Arc<AppState>>) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let rows = state.store.list_threads().map_err(|e| crate::http::engine_error_response(e.into()))?;
    let mut threads = Vec::with_capacity(rows.len());
    for row in rows {
        let session = state
            .store
            .get_chat_session_by_thread(&row.thread_id)
            .map_err(|e| crate::http::engine_error_response(e.into()))?;
        let (updated_at, sandbox_info) = match session {
            Some(s) => (s.last_active_at, json!({"status": s.status, "terminal_id": s.terminal_id})),
            None => (row.created_at.clone(), Value::Null),
        };
        threads.push(ThreadSummary { thread_id: row.thread_id, preview: row.preview, updated_at, sandbox_info });
    }
    Ok(Json(json!({ "threads": threads })))
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub sandbox: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// `POST /api/threads {sandbox, cwd?}`. `sandbox` names the
/// provider backing the new thread's lease; an unregistered name is a 400.
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let thread_id = agentcore_core::types::ThreadId::new().to_string();
    state
        .store
        .create_thread(&thread_id, &chrono::Utc::now().to_rfc3339())
        .map_err(|e| crate::http::engine_error_response(e.into()))?;
    state.queue.set_mode(&thread_id, state.config.agent.queue_mode);
    state
        .sandbox
        .get_sandbox_with_provider(&thread_id, req.cwd.as_deref(), req.sandbox.as_deref())
        .await
        .map_err(|e| crate::http::engine_error_response(e.into()))?;
    Ok(Json(json!({ "thread_id": thread_id })))
}

/// `GET /api/threads/{id}`: the full thread — persisted
/// conversation turns plus session/terminal/sandbox state.
pub async fn get_thread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let thread = state
        .store
        .get_thread(&id)
        .map_err(|e| crate::http::engine_error_response(e.into()))?
        .ok_or_else(|| not_found(format!("thread {id} not found")))?;
    let session = state.store.get_chat_session_by_thread(&id).map_err(|e| crate::http::engine_error_response(e.into()))?;
    let terminal = state.store.get_terminal_by_thread(&id).map_err(|e| crate::http::engine_error_response(e.into()))?;
    let messages = state.store.load_thread_messages(&id).map_err(|e| crate::http::engine_error_response(e.into()))?;

    Ok(Json(json!({
        "thread_id": thread.thread_id,
        "created_at": thread.created_at,
        "preview": thread.preview,
        "messages": messages
            .into_iter()
            .map(|m| json!({"role": m.role, "content": m.content, "created_at": m.created_at}))
            .collect::<Vec<_>>(),
        "session": session.map(|s| json!({
            "status": s.status,
            "created_at": s.created_at,
            "last_active_at": s.last_active_at,
        })),
        "terminal": terminal.map(|t| json!({"terminal_id": t.terminal_id, "lease_id": t.lease_id, "version": t.version})),
        "run_state": state.executor.state_of(&id).to_string(),
    })))
}

/// `DELETE /api/threads/{id}`. Leaves the underlying lease in
/// place; see `agentcore_store::Store::delete_thread`.
pub async fn delete_thread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state.store.delete_thread(&id).map_err(|e| crate::http::engine_error_response(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}
