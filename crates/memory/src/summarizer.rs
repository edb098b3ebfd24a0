use async_trait::async_trait;

use crate::error::Result;

/// Produces a semantic summary of a batch of conversation text.
///
/// Deliberately provider-agnostic: concrete LLM provider SDKs are out of
/// scope for this crate, so the compactor depends on this trait rather than
/// a concrete `send()` call. The composition root (the gateway binary)
/// supplies the real implementation, backed by whichever provider
/// `compaction.summary_model` (or `agent.model`) resolves to.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, model: &str, transcript: &str) -> Result<String>;
}

/// Test/offline summarizer that just truncates — useful for exercising the
/// compactor's control flow without a live model call.
pub struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, _model: &str, transcript: &str) -> Result<String> {
        const MAX: usize = 2000;
        if transcript.len() > MAX {
            let boundary = (0..=MAX).rev().find(|i| transcript.is_char_boundary(*i)).unwrap_or(0);
            Ok(format!("{}… [truncated summary]", &transcript[..boundary]))
        } else {
            Ok(transcript.to_string())
        }
    }
}
