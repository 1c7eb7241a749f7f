//! History compactor (C9): decides when a conversation has grown too large
//! for a model's context window and shrinks it via one of two policies.
//!
//! Token counting prefers a provider-reported count; the fallback used
//! throughout this module (`ceil(chars/4)` plus one token per message for
//! its role marker) is the same heuristic the teacher's `llm_session.rs`
//! uses for its own local estimate.

use log::{debug, warn};

use crate::runtime::errors::ProviderError;
use crate::runtime::llm_client::{LlmClient, Message, ToolDefinition};

/// Default context window assumed for a model this crate doesn't recognize.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;
/// Compaction triggers once usage reaches this fraction of the window.
pub const COMPACTION_THRESHOLD: f64 = 0.80;

const KEEP_FIRST: usize = 1;
const KEEP_LAST: usize = 4;

fn known_context_window(model: &str) -> Option<u64> {
    match model {
        "gpt-4.1" | "gpt-4o" => Some(128_000),
        "gpt-4.1-mini" => Some(128_000),
        "claude-3-5-sonnet" => Some(200_000),
        _ => None,
    }
}

pub fn context_window_for(model: &str) -> u64 {
    known_context_window(model).unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// `ceil(chars/4)` per message content, plus one token for the role marker.
pub fn count_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .map(|m| 1 + (m.content.chars().count() as u64).div_ceil(4))
        .sum()
}

pub fn should_compact(tokens_used: u64, model: &str) -> bool {
    let window = context_window_for(model);
    (tokens_used as f64) >= COMPACTION_THRESHOLD * (window as f64)
}

#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub compacted_messages: Vec<Message>,
    pub original_tokens: u64,
    pub compacted_tokens: u64,
    pub messages_removed: usize,
}

fn no_op(messages: &[Message]) -> CompactionResult {
    let tokens = count_tokens(messages);
    CompactionResult { compacted_messages: messages.to_vec(), original_tokens: tokens, compacted_tokens: tokens, messages_removed: 0 }
}

/// Keep the first `KEEP_FIRST` and last `KEEP_LAST` messages, dropping
/// everything between. No-op at `<= KEEP_FIRST + KEEP_LAST` messages
/// (`spec.md` §4.9).
pub fn truncate(messages: &[Message]) -> CompactionResult {
    if messages.len() <= KEEP_FIRST + KEEP_LAST {
        return no_op(messages);
    }
    let original_tokens = count_tokens(messages);
    let mut compacted = messages[..KEEP_FIRST].to_vec();
    compacted.extend_from_slice(&messages[messages.len() - KEEP_LAST..]);
    let compacted_tokens = count_tokens(&compacted);
    CompactionResult {
        messages_removed: messages.len() - compacted.len(),
        compacted_tokens,
        original_tokens,
        compacted_messages: compacted,
    }
}

/// Truncate-equivalent when no LLM is available; otherwise replaces the
/// dropped middle with a single LLM-authored summary message (`spec.md`
/// §4.9, grounded in `zavora-ai-zavora-cli`'s `summarize_events_text`
/// shape).
pub async fn summarize(llm_client: Option<&dyn LlmClient>, model: &str, messages: &[Message]) -> CompactionResult {
    if messages.len() <= KEEP_FIRST + KEEP_LAST {
        return no_op(messages);
    }

    let Some(client) = llm_client else {
        debug!("summarize: no LLM client available, falling back to truncate");
        return truncate(messages);
    };

    let middle = &messages[KEEP_FIRST..messages.len() - KEEP_LAST];
    let summary = summarize_via_llm(client, model, middle).await;

    let original_tokens = count_tokens(messages);
    let mut compacted = messages[..KEEP_FIRST].to_vec();
    match summary {
        Some(text) => compacted.push(Message::system(format!("Summary of earlier conversation:\n{text}"))),
        None => warn!("summarize: LLM summary call failed, dropping middle without a replacement summary"),
    }
    compacted.extend_from_slice(&messages[messages.len() - KEEP_LAST..]);

    let compacted_tokens = count_tokens(&compacted);
    CompactionResult {
        messages_removed: messages.len() - compacted.len(),
        compacted_tokens,
        original_tokens,
        compacted_messages: compacted,
    }
}

const SUMMARY_PROMPT: &str =
    "Summarize the following conversation history concisely, preserving any decisions, facts, or open questions a later turn would need.";

async fn summarize_via_llm(client: &dyn LlmClient, model: &str, middle: &[Message]) -> Option<String> {
    let transcript = middle
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    let messages = vec![Message::system(SUMMARY_PROMPT), Message::user(transcript)];
    let tools: Vec<ToolDefinition> = Vec::new();
    match client.complete(model, &messages, &tools).await {
        Ok(result) => Some(result.message.content.to_string()),
        Err(err) => {
            log_summary_failure(&err);
            None
        }
    }
}

fn log_summary_failure(err: &ProviderError) {
    warn!("history summary call failed: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("message {i}"))).collect()
    }

    #[test]
    fn should_compact_triggers_at_eighty_percent() {
        assert!(should_compact(102_400, "gpt-4.1")); // exactly 80% of 128k
        assert!(!should_compact(102_399, "gpt-4.1"));
    }

    #[test]
    fn unknown_model_uses_default_window() {
        assert_eq!(context_window_for("some-future-model"), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn truncate_is_noop_at_five_messages() {
        let msgs = messages(5);
        let result = truncate(&msgs);
        assert_eq!(result.messages_removed, 0);
        assert_eq!(result.compacted_messages.len(), 5);
    }

    #[test]
    fn truncate_keeps_first_and_last_four() {
        let msgs = messages(10);
        let result = truncate(&msgs);
        assert_eq!(result.compacted_messages.len(), 5);
        assert_eq!(&*result.compacted_messages[0].content, "message 0");
        assert_eq!(&*result.compacted_messages[1].content, "message 6");
        assert_eq!(&*result.compacted_messages[4].content, "message 9");
    }

    #[tokio::test]
    async fn summarize_falls_back_to_truncate_without_llm_client() {
        let msgs = messages(10);
        let result = summarize(None, "gpt-4.1", &msgs).await;
        assert_eq!(result.compacted_messages.len(), 5);
    }
}
