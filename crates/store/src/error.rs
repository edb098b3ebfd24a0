use thiserror::Error;

/// Errors raised by the durable store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("version conflict updating {what}: expected {expected}, found {found}")]
    VersionConflict { what: String, expected: i64, found: i64 },
}

impl From<StoreError> for agentcore_core::error::EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { what } => agentcore_core::error::EngineError::InvalidInput {
                message: format!("not found: {what}"),
                suggestion: None,
            },
            other => agentcore_core::error::EngineError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
