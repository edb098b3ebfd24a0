pub mod error;
pub mod executor;
pub mod retry;
pub mod subagent;
pub mod types;

pub use error::{Result, SchedulerError};
pub use executor::{RunExecutor, UnknownToolTerminal};
pub use retry::retry_transient;
pub use subagent::SchedulerSubAgentSpawner;
pub use types::{RunEvent, RunState};
