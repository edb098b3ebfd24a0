use std::sync::Arc;

use agentcore_core::config::CompactionConfig;
use tracing::{info, warn};

use crate::error::Result;
use crate::summarizer::Summarizer;
use crate::summary_store::SummaryStore;
use crate::types::{CompactionOutcome, Message, MessageRole};

/// Crude chars-per-token estimator (~4 chars/token), used when no real
/// tokenizer is wired up. Unlike provider-reported usage, this can run
/// before a model call happens at all.
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    (chars / 4) as u64
}

/// LLM-driven semantic compaction: threshold check, partition off the old
/// head, summarization call, persist, then replace the head in place with
/// one synthetic summary message. The trigger is a token budget rather than
/// a turn count, so a few huge tool results compact as eagerly as many
/// small turns.
pub struct Compactor {
    config: CompactionConfig,
    summaries: SummaryStore,
    summarizer: Arc<dyn Summarizer>,
}

impl Compactor {
    pub fn new(config: CompactionConfig, summaries: SummaryStore, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { config, summaries, summarizer }
    }

    /// Runs a compaction pass if `messages`' estimated token count has
    /// reached `context_limit - reserve_tokens`. Mutates `messages` in
    /// place on success; leaves them untouched on `NotNeeded`/`Aborted`.
    pub async fn compact_if_needed(
        &self,
        thread_id: &str,
        messages: &mut Vec<Message>,
        model: &str,
        context_limit: u64,
    ) -> Result<CompactionOutcome> {
        let estimated = estimate_tokens(messages);
        let trigger = context_limit.saturating_sub(self.config.reserve_tokens);
        if estimated < trigger {
            return Ok(CompactionOutcome::NotNeeded);
        }

        info!(thread_id, estimated, trigger, "compaction threshold reached");

        let (head, tail) = partition_head_tail(messages, self.config.reserve_tokens);
        if head.is_empty() {
            return Ok(CompactionOutcome::NotNeeded);
        }

        let mut slots = Vec::new();
        let mut summarizable_head = Vec::with_capacity(head.len());
        for message in &head {
            if message.content.len() > self.config.split_turn_chars {
                let mid = message.content.len() / 2;
                let boundary = floor_char_boundary(&message.content, mid);
                let (first_half, second_half) = message.content.split_at(boundary);

                let slot_a = self.summaries.append(thread_id, first_half, estimate_chunk_tokens(first_half), 0)?;
                let slot_b = self.summaries.append(thread_id, second_half, estimate_chunk_tokens(second_half), 0)?;
                slots.push(slot_a);
                slots.push(slot_b);
                summarizable_head.push(Message::new(
                    message.role,
                    format!("[see summary slots {slot_a},{slot_b} for full content]"),
                ));
            } else {
                summarizable_head.push(message.clone());
            }
        }

        let transcript = render_transcript(&summarizable_head);
        let summary = match self.summarizer.summarize(model, &transcript).await {
            Ok(s) => s,
            Err(e) => {
                warn!(thread_id, error = %e, "compaction summarizer call failed, leaving conversation untouched");
                return Ok(CompactionOutcome::Aborted { reason: e.to_string() });
            }
        };

        let slot = self.summaries.append(thread_id, &summary, estimate_chunk_tokens(&summary), head.len() as u64)?;
        slots.push(slot);

        messages.clear();
        messages.push(Message::new(MessageRole::System, format!("[summary] {summary}")));
        messages.extend(tail);

        Ok(CompactionOutcome::Compacted { slots })
    }
}

fn estimate_chunk_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Splits `messages` into `(head, tail)` where `tail` is the suffix of most
/// recent messages whose combined estimated tokens reach
/// `keep_recent_tokens`. `reserve_tokens` doubles as the recent-window
/// budget — the same headroom compaction is trying to win back is what the
/// tail is allowed to keep.
fn partition_head_tail(messages: &[Message], keep_recent_tokens: u64) -> (Vec<Message>, Vec<Message>) {
    let mut tail_tokens = 0u64;
    let mut split_at = messages.len();
    for (i, message) in messages.iter().enumerate().rev() {
        let message_tokens = (message.content.len() / 4) as u64;
        if tail_tokens >= keep_recent_tokens && i < messages.len() - 1 {
            split_at = i + 1;
            break;
        }
        tail_tokens += message_tokens;
        split_at = i;
    }
    let head = messages[..split_at].to_vec();
    let tail = messages[split_at..].to_vec();
    (head, tail)
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::EchoSummarizer;
    use agentcore_store::Store;

    fn new_compactor() -> Compactor {
        let store = Arc::new(Store::open_in_memory().unwrap());
        Compactor::new(
            CompactionConfig { reserve_tokens: 100, summary_model: None, split_turn_chars: 50_000 },
            SummaryStore::new(store),
            Arc::new(EchoSummarizer),
        )
    }

    #[tokio::test]
    async fn skips_compaction_below_trigger() {
        let compactor = new_compactor();
        let mut messages = vec![Message::new(MessageRole::User, "hi")];
        let outcome = compactor.compact_if_needed("t1", &mut messages, "agentcore:mini", 100_000).await.unwrap();
        assert_eq!(outcome, CompactionOutcome::NotNeeded);
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn compacts_and_replaces_head_with_summary() {
        let compactor = new_compactor();
        let mut messages: Vec<Message> =
            (0..50).map(|i| Message::new(MessageRole::User, format!("message {i} ").repeat(20))).collect();
        let before_len = messages.len();

        let outcome = compactor.compact_if_needed("t1", &mut messages, "agentcore:mini", 400).await.unwrap();
        assert!(matches!(outcome, CompactionOutcome::Compacted { .. }));
        assert!(messages.len() < before_len);
        assert!(matches!(messages[0].role, MessageRole::System));
        assert!(messages[0].content.starts_with("[summary]"));
    }

    #[tokio::test]
    async fn oversized_message_is_split_into_two_summary_slots() {
        let compactor = new_compactor();
        let compactor = Compactor::new(
            CompactionConfig { reserve_tokens: 10, summary_model: None, split_turn_chars: 100 },
            compactor.summaries,
            compactor.summarizer,
        );
        let mut messages = vec![Message::new(MessageRole::Tool, "x".repeat(500)), Message::new(MessageRole::User, "hi")];
        let outcome = compactor.compact_if_needed("t1", &mut messages, "agentcore:mini", 200).await.unwrap();
        match outcome {
            CompactionOutcome::Compacted { slots } => assert!(slots.len() >= 3),
            other => panic!("expected Compacted, got {other:?}"),
        }
    }
}
