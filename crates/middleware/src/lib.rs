pub mod chain;
pub mod command;
pub mod error;
pub mod filesystem;
pub mod memory_middleware;
pub mod monitor;
pub mod prompt_caching;
pub mod queue_middleware;
pub mod safety;
pub mod search;
pub mod skill;
pub mod task;
pub mod todo;
pub mod types;

pub use chain::{Middleware, MiddlewareStack, ModelCaller, ToolCaller};
pub use command::CommandMiddleware;
pub use error::{MiddlewareError, Result};
pub use filesystem::FileSystemMiddleware;
pub use memory_middleware::MemoryMiddleware;
pub use monitor::{MonitorMiddleware, ObserverSink};
pub use prompt_caching::PromptCachingMiddleware;
pub use queue_middleware::QueueMiddleware;
pub use safety::{CommandHook, DangerousCommandHook, HookChain, NetworkBlockerHook};
pub use search::{SearchMiddleware, SearchProvider};
pub use skill::{SkillDefinition, SkillMiddleware};
pub use task::{SubAgentSpawner, TaskMiddleware};
pub use todo::{TodoItem, TodoMiddleware, TodoStatus};
pub use types::{
    AgentContext, ChatMessage, ModelRequest, ModelResponse, ModelToolCall, Role, TokenUsage, ToolCall, ToolResult,
    ToolSchema,
};
