pub mod config;
pub mod error;
pub mod types;

pub use config::AgentCoreConfig;
pub use error::{EngineError, ErrorKind, Result};
