use thiserror::Error;

/// The engine-wide error kind taxonomy.
///
/// This is deliberately a thin enum (no payload) so it can be attached to
/// any concrete error as a classification without forcing every crate to
/// match on `EngineError`'s variants directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed tool arguments, forbidden path, unknown tool.
    /// Surfaced to the LLM as a tool_result with `is_error=true`; never
    /// crashes the run.
    InvalidInput,
    /// Blocked by a hook (dangerous command, network). Surfaced to the LLM;
    /// never retried.
    PolicyDenied,
    /// Timeout or transient provider failure. Retried by the middleware
    /// stack up to a configurable budget.
    Transient,
    /// Auth failure, quota exceeded, permanent sandbox loss. The owning
    /// lease is marked dead and the session closed.
    ProviderFatal,
    /// Invariant violation, type mismatch. Terminates the run; durable
    /// state is left untouched.
    InternalBug,
    /// Not an error — the run was cancelled.
    Cancelled,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::PolicyDenied => "POLICY_DENIED",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::ProviderFatal => "PROVIDER_FATAL",
            ErrorKind::InternalBug => "INTERNAL_BUG",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

/// Top-level error type shared by the engine crates.
///
/// Individual crates (store, sandbox, memory, …) define their own
/// `thiserror` enums for their local failure modes and convert into this
/// one at the boundary where a `tool_result`/`run` event needs to be
/// produced; the crate-local enums never leak past that boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String, suggestion: Option<String> },

    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("provider fatal error: {0}")]
    ProviderFatal(String),

    #[error("internal bug: {0}")]
    InternalBug(String),

    #[error("cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput { .. } => ErrorKind::InvalidInput,
            EngineError::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            EngineError::Transient(_) => ErrorKind::Transient,
            EngineError::ProviderFatal(_) => ErrorKind::ProviderFatal,
            EngineError::InternalBug(_) => ErrorKind::InternalBug,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Database(_)
            | EngineError::Serialization(_)
            | EngineError::Io(_)
            | EngineError::Config(_) => ErrorKind::InternalBug,
        }
    }

    pub fn invalid_input(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
