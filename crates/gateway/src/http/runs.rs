//! `/api/threads/{id}/runs*`: starts, cancels, and replays runs.
//!
//! Streaming builds an `async_stream::stream!` over the executor's event
//! channel and serves it as `Sse::new(..).keep_alive(..)`.
//! `RunExecutor::start_run` spawns its own driver task internally, so the
//! handler only needs a cheap `Arc::clone` of the state to persist events
//! as they're forwarded.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppState;
use crate::http::{engine_error_response, not_found, ApiError};
use agentcore_scheduler::RunEvent;

fn event_type_name(event: &RunEvent) -> &'static str {
    match event {
        RunEvent::Started { .. } => "started",
        RunEvent::TextDelta { .. } => "text_delta",
        RunEvent::ToolCall { .. } => "tool_call",
        RunEvent::ToolResult { .. } => "tool_result",
        RunEvent::SubAgent { .. } => "subagent",
        RunEvent::Status { .. } => "status",
        RunEvent::Done { .. } => "done",
        RunEvent::Cancelled { .. } => "cancelled",
        RunEvent::Failed { .. } => "failed",
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// First-user-message excerpt stored as the thread preview.
fn preview_excerpt(message: &str) -> String {
    const MAX: usize = 120;
    let line = message.lines().next().unwrap_or("");
    if line.len() <= MAX {
        line.to_string()
    } else {
        let boundary = (0..=MAX).rev().find(|i| line.is_char_boundary(*i)).unwrap_or(0);
        format!("{}…", &line[..boundary])
    }
}

/// `POST /api/threads/{id}/runs {message}` → SSE stream of `RunEvent`s, one
/// `event: <type>\ndata: <json>\n\n` frame per event.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StartRunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ApiError>)> {
    let model = match req.model {
        Some(m) => m,
        None => state.config.agent.resolved_model().map_err(engine_error_response)?,
    };

    let now = chrono::Utc::now().to_rfc3339();
    state.store.create_thread(&id, &now).map_err(|e| engine_error_response(e.into()))?;
    state
        .store
        .set_thread_preview_if_empty(&id, &preview_excerpt(&req.message))
        .map_err(|e| engine_error_response(e.into()))?;
    state
        .store
        .append_thread_message(&id, "user", &req.message, &now)
        .map_err(|e| engine_error_response(e.into()))?;

    let mut rx = state
        .executor
        .start_run(id.clone(), model, req.message)
        .map_err(|e| engine_error_response(e.into()))?;

    let state = state.clone();
    let thread_id = id;
    let stream = async_stream::stream! {
        let mut assistant_text = String::new();
        while let Some(event) = rx.recv().await {
            let run_id = event.run_id().to_string();
            state.last_run_id.insert(thread_id.clone(), run_id.clone());

            match &event {
                RunEvent::TextDelta { text, .. } => assistant_text.push_str(text),
                RunEvent::Done { .. } => {
                    let created_at = chrono::Utc::now().to_rfc3339();
                    if let Err(e) = state.store.append_thread_message(&thread_id, "assistant", &assistant_text, &created_at) {
                        tracing::warn!(thread_id = %thread_id, error = %e, "failed to persist assistant message");
                    }
                }
                _ => {}
            }

            let event_type = event_type_name(&event);
            let data = serde_json::to_string(&event).unwrap_or_default();
            let created_at = chrono::Utc::now().to_rfc3339();
            if let Err(e) = state.store.append_run_event(&run_id, event.seq() as i64, event_type, &data, &created_at) {
                tracing::warn!(thread_id = %thread_id, error = %e, "failed to persist run event");
            }

            yield Ok(Event::default().event(event_type).data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /api/threads/{id}/runs/cancel`.
pub async fn cancel_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    state.executor.cancel(&id);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub after: i64,
}

/// `GET /api/threads/{id}/runs/stream?after=<seq>`: replays the
/// thread's most recent run from durable storage, not a live tail — a
/// reconnecting client that wants to keep following an in-flight run should
/// re-issue `POST .../runs` instead.
pub async fn stream_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let run_id = state
        .last_run_id
        .get(&id)
        .map(|r| r.clone())
        .ok_or_else(|| not_found(format!("no run recorded for thread {id}")))?;

    let rows = state
        .store
        .load_run_events_after(&run_id, query.after)
        .map_err(|e| engine_error_response(e.into()))?;

    let events: Vec<Value> = rows.into_iter().map(|r| serde_json::from_str(&r.data_json).unwrap_or(Value::Null)).collect();
    Ok(Json(serde_json::json!({ "run_id": run_id, "events": events })))
}
