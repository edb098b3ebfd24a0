use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String, suggestion: Option<String> },

    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("sandbox error: {0}")]
    Sandbox(#[from] agentcore_sandbox::SandboxError),

    #[error("memory error: {0}")]
    Memory(#[from] agentcore_memory::MemoryError),

    #[error("all providers failed: {0}")]
    AllProvidersFailed(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider failure: {0}")]
    ProviderFatal(String),
}

impl MiddlewareError {
    pub fn invalid_input(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        MiddlewareError::InvalidInput { message: message.into(), suggestion: Some(suggestion.into()) }
    }

    pub fn kind(&self) -> agentcore_core::error::ErrorKind {
        use agentcore_core::error::ErrorKind;
        match self {
            MiddlewareError::InvalidInput { .. } => ErrorKind::InvalidInput,
            MiddlewareError::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            MiddlewareError::UnknownTool(_) => ErrorKind::InvalidInput,
            MiddlewareError::AllProvidersFailed(_) => ErrorKind::Transient,
            MiddlewareError::Transient(_) => ErrorKind::Transient,
            MiddlewareError::ProviderFatal(_) => ErrorKind::ProviderFatal,
            MiddlewareError::Sandbox(e) => e.kind(),
            MiddlewareError::Memory(_) => ErrorKind::InternalBug,
        }
    }
}

impl From<MiddlewareError> for agentcore_core::error::EngineError {
    fn from(err: MiddlewareError) -> Self {
        use agentcore_core::error::EngineError;
        match err {
            MiddlewareError::InvalidInput { message, suggestion } => EngineError::InvalidInput { message, suggestion },
            MiddlewareError::PolicyDenied { reason } => EngineError::PolicyDenied { reason },
            MiddlewareError::UnknownTool(name) => {
                EngineError::invalid_input(format!("unknown tool: {name}"), "check the tool name against the registered schema")
            }
            MiddlewareError::AllProvidersFailed(reason) => EngineError::Transient(reason),
            MiddlewareError::Transient(reason) => EngineError::Transient(reason),
            MiddlewareError::ProviderFatal(reason) => EngineError::ProviderFatal(reason),
            MiddlewareError::Sandbox(e) => EngineError::from(e),
            MiddlewareError::Memory(e) => EngineError::from(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, MiddlewareError>;
