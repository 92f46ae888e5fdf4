//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, accurate within
//! ~10% for BPE tokenizers on English text. This is a documented heuristic,
//! not a tokenizer — callers budget with it, they must not treat the numbers
//! as exact counts.

use midstream_core::message::{Message, MessageContent};

/// Structural cost of a tool message (role framing, ids, block markers) not
/// captured by the serialized content length.
pub const TOOL_MESSAGE_OVERHEAD: usize = 50;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// Estimate tokens for an arbitrary JSON value via its serialized length.
pub fn estimate_value_tokens(value: &serde_json::Value) -> usize {
    let json = serde_json::to_string(value).unwrap_or_default();
    estimate_tokens(&json)
}

/// Estimate tokens for a single message.
///
/// Tool messages carry [`TOOL_MESSAGE_OVERHEAD`] on top of their serialized
/// content length.
pub fn estimate_message_tokens(message: &Message) -> usize {
    match &message.content {
        MessageContent::Text { text } => estimate_tokens(text),
        MessageContent::ToolInvocation(inv) => {
            estimate_value_tokens(&inv.arguments) + TOOL_MESSAGE_OVERHEAD
        }
        MessageContent::ToolOutcome(out) => {
            estimate_value_tokens(&out.payload) + TOOL_MESSAGE_OVERHEAD
        }
    }
}

/// Estimate tokens for a slice of messages.
pub fn estimate_window_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
