pub mod chat_session;
pub mod error;
pub mod lease;
pub mod local_provider;
pub mod manager;
pub mod mock_provider;
pub mod provider;
pub mod runtime;
pub mod terminal;
pub mod types;

pub use chat_session::ChatSession;
pub use error::{Result, SandboxError};
pub use lease::SandboxLease;
pub use manager::{SandboxCapability, SandboxManager, SandboxTypeInfo};
pub use provider::Provider;
pub use runtime::PhysicalTerminalRuntime;
pub use terminal::AbstractTerminal;
