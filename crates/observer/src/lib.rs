pub mod context_monitor;
pub mod cost_calculator;
pub mod runtime;
pub mod state_monitor;
pub mod token_monitor;

pub use context_monitor::{ContextMonitor, ContextSnapshot};
pub use cost_calculator::{CostBreakdown, CostCalculator, PriceTable};
pub use runtime::{AgentRuntime, RuntimeStatus};
pub use state_monitor::{AgentState, StateMonitor};
pub use token_monitor::{normalize_usage, TokenMonitor};
