pub mod health;
pub mod queue;
pub mod runs;
pub mod sandbox;
pub mod status;
pub mod threads;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Uniform JSON error body for every handler in this crate.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

/// Maps an `agentcore_core::error::EngineError` to a status code via its
/// `ErrorKind`, the same classification the scheduler and sandbox crates
/// already attach to their own errors at the `EngineError` boundary.
pub fn engine_error_response(err: agentcore_core::error::EngineError) -> (StatusCode, Json<ApiError>) {
    use agentcore_core::error::ErrorKind;
    let status = match err.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::PolicyDenied => StatusCode::FORBIDDEN,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ProviderFatal => StatusCode::BAD_GATEWAY,
        ErrorKind::InternalBug => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
    };
    (status, Json(ApiError::new(err.to_string())))
}

pub fn not_found(what: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::NOT_FOUND, Json(ApiError::new(what)))
}

pub fn bad_request(what: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError::new(what)))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
