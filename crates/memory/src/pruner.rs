use agentcore_core::config::PruningConfig;

use crate::types::{Message, MessageRole};

/// Structural, cheap truncation of old tool results.
///
/// Pure function over the message list — no I/O, no locking — run on every
/// turn boundary by the scheduler before the LLM call is made. Tool results
/// within the most recent `protect_recent_turns` tool results are left
/// untouched regardless of size.
pub fn prune_messages(messages: &mut [Message], config: &PruningConfig) {
    let tool_result_indices: Vec<usize> =
        messages.iter().enumerate().filter(|(_, m)| m.is_tool_result()).map(|(i, _)| i).collect();

    let protected_count = config.protect_recent_turns.min(tool_result_indices.len());
    let prunable_cutoff = tool_result_indices.len() - protected_count;
    let prunable: &[usize] = &tool_result_indices[..prunable_cutoff];

    for &idx in prunable {
        let message = &mut messages[idx];
        if message.pruned {
            continue;
        }
        if message.content.len() > config.hard_clear_threshold {
            let cleared = format!("[cleared: {} chars]", message.content.len());
            message.content = cleared;
            message.pruned = true;
        } else if message.content.len() > config.soft_trim_chars {
            message.content.truncate(config.soft_trim_chars);
            message.content.push_str(" [trimmed]");
            message.pruned = true;
        }
    }
}

/// Total character count across all messages, used as a cheap proxy before
/// a real tokenizer estimate is available (mirrors `estimate_tokens`'s
/// fallback path).
pub fn total_chars(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.content.len()).sum()
}

/// `System` and `Assistant` messages are never eligible for structural
/// pruning — only tool results are.
pub fn is_prunable(message: &Message) -> bool {
    matches!(message.role, MessageRole::Tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PruningConfig {
        PruningConfig { soft_trim_chars: 10, hard_clear_threshold: 20, protect_recent_turns: 1 }
    }

    #[test]
    fn trims_old_tool_result_over_soft_threshold() {
        let mut messages = vec![
            Message::new(MessageRole::Tool, "x".repeat(15)),
            Message::new(MessageRole::Assistant, "ok"),
            Message::new(MessageRole::Tool, "y".repeat(5)),
        ];
        prune_messages(&mut messages, &cfg());
        assert!(messages[0].content.ends_with("[trimmed]"));
        assert_eq!(messages[0].content.len(), 10 + " [trimmed]".len());
    }

    #[test]
    fn clears_old_tool_result_over_hard_threshold() {
        let mut messages = vec![
            Message::new(MessageRole::Tool, "z".repeat(30)),
            Message::new(MessageRole::Tool, "w".repeat(5)),
        ];
        prune_messages(&mut messages, &cfg());
        assert_eq!(messages[0].content, "[cleared: 30 chars]");
    }

    #[test]
    fn protects_most_recent_tool_results() {
        let mut messages =
            vec![Message::new(MessageRole::Tool, "a".repeat(30)), Message::new(MessageRole::Tool, "b".repeat(30))];
        prune_messages(&mut messages, &cfg());
        assert_eq!(messages[0].content, "[cleared: 30 chars]");
        assert_eq!(messages[1].content, "b".repeat(30));
    }

    #[test]
    fn is_idempotent_on_already_pruned_messages() {
        let mut messages = vec![Message::new(MessageRole::Tool, "c".repeat(30)), Message::new(MessageRole::Tool, "d")];
        prune_messages(&mut messages, &cfg());
        let after_first = messages[0].content.clone();
        prune_messages(&mut messages, &cfg());
        assert_eq!(messages[0].content, after_first);
    }
}
