pub mod compactor;
pub mod error;
pub mod pruner;
pub mod summarizer;
pub mod summary_store;
pub mod types;

pub use compactor::{estimate_tokens, Compactor};
pub use error::{MemoryError, Result};
pub use pruner::prune_messages;
pub use summarizer::{EchoSummarizer, Summarizer};
pub use summary_store::SummaryStore;
pub use types::{CompactionOutcome, Message, MessageRole};
