//! The pairing filter — enforces tool invocation/outcome adjacency.
//!
//! A window sent to the provider must satisfy: every tool invocation is
//! immediately followed by the outcome with the same correlation id, and no
//! outcome appears without its invocation directly before it. Providers
//! reject sequences that break this, so the filter runs as the last step of
//! window assembly.

use midstream_core::message::{Message, MessageContent};

/// Return a new sequence satisfying the pairing invariant.
///
/// Linear scan: on a tool invocation, inspect the next element — if it is the
/// matching outcome, keep both; otherwise drop the invocation, and drop the
/// next element too when it is *some* outcome (by construction it cannot
/// belong to a different invocation). Orphan outcomes are dropped. All other
/// messages pass through; surviving order is preserved.
pub fn enforce_pairing(messages: Vec<Message>) -> Vec<Message> {
    let mut kept = Vec::with_capacity(messages.len());
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        match &message.content {
            MessageContent::ToolInvocation(inv) => {
                let next_matches = iter
                    .peek()
                    .and_then(|next| next.content.as_outcome())
                    .is_some_and(|out| out.correlation_id == inv.correlation_id);

                if next_matches {
                    kept.push(message);
                    if let Some(outcome) = iter.next() {
                        kept.push(outcome);
                    }
                } else if iter
                    .peek()
                    .is_some_and(|next| next.content.as_outcome().is_some())
                {
                    // a mismatched outcome cannot pair with anything later
                    iter.next();
                }
            }
            // an outcome here has no invocation directly before it
            MessageContent::ToolOutcome(_) => {}
            MessageContent::Text { .. } => kept.push(message),
        }
    }

    kept
}
