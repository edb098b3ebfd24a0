use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("middleware error: {0}")]
    Middleware(#[from] agentcore_middleware::MiddlewareError),

    #[error("thread {thread_id} already has an active run (currently {state})")]
    RunNotIdle { thread_id: String, state: String },

    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("cancelled")]
    Cancelled,
}

impl SchedulerError {
    pub fn kind(&self) -> agentcore_core::error::ErrorKind {
        use agentcore_core::error::ErrorKind;
        match self {
            SchedulerError::Middleware(e) => e.kind(),
            SchedulerError::RunNotIdle { .. } => ErrorKind::InvalidInput,
            SchedulerError::RetryExhausted { .. } => ErrorKind::Transient,
            SchedulerError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<SchedulerError> for agentcore_core::error::EngineError {
    fn from(err: SchedulerError) -> Self {
        use agentcore_core::error::EngineError;
        match err {
            SchedulerError::Middleware(e) => EngineError::from(e),
            SchedulerError::RunNotIdle { thread_id, state } => {
                EngineError::invalid_input(format!("thread {thread_id} already has an active run (currently {state})"), "wait for the current run to finish or cancel it first")
            }
            SchedulerError::RetryExhausted { last_error, .. } => EngineError::Transient(last_error),
            SchedulerError::Cancelled => EngineError::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
