use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("store error: {0}")]
    Store(#[from] agentcore_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("summarization failed: {reason}")]
    SummarizationFailed { reason: String },
}

impl From<MemoryError> for agentcore_core::error::EngineError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Store(e) => e.into(),
            MemoryError::Serialization(e) => agentcore_core::error::EngineError::Serialization(e),
            MemoryError::SummarizationFailed { reason } => agentcore_core::error::EngineError::Transient(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
