use thiserror::Error;

/// Classification of a provider failure. Mirrors
/// `agentcore_core::error::ErrorKind` but scoped to the provider boundary —
/// `SandboxError::from` maps it onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Transient,
    Auth,
    Quota,
    Permanent,
}

#[derive(Debug, Error, Clone)]
#[error("provider error ({kind:?}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] agentcore_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("chat session not found for thread {thread_id}")]
    SessionNotFound { thread_id: String },

    #[error("lease {lease_id} has no active instance")]
    NoActiveInstance { lease_id: String },

    #[error("unknown sandbox provider: {0}")]
    UnknownProvider(String),

    #[error("invalid terminal state: {0}")]
    InvalidState(String),
}

impl SandboxError {
    pub fn kind(&self) -> agentcore_core::error::ErrorKind {
        use agentcore_core::error::ErrorKind;
        match self {
            SandboxError::Provider(p) => match p.kind {
                ProviderErrorKind::Transient => ErrorKind::Transient,
                ProviderErrorKind::Auth | ProviderErrorKind::Quota | ProviderErrorKind::Permanent => {
                    ErrorKind::ProviderFatal
                }
            },
            SandboxError::SessionNotFound { .. }
            | SandboxError::NoActiveInstance { .. }
            | SandboxError::UnknownProvider(_) => ErrorKind::InvalidInput,
            SandboxError::InvalidState(_) => ErrorKind::InternalBug,
            SandboxError::Store(_) | SandboxError::Serialization(_) => ErrorKind::InternalBug,
        }
    }
}

impl From<SandboxError> for agentcore_core::error::EngineError {
    fn from(err: SandboxError) -> Self {
        use agentcore_core::error::EngineError;
        let kind = err.kind();
        match kind {
            agentcore_core::error::ErrorKind::Transient => EngineError::Transient(err.to_string()),
            agentcore_core::error::ErrorKind::ProviderFatal => EngineError::ProviderFatal(err.to_string()),
            agentcore_core::error::ErrorKind::InvalidInput => {
                EngineError::invalid_input(err.to_string(), "check the thread/lease identifiers and retry")
            }
            _ => EngineError::InternalBug(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
