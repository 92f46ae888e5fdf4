//! Context window assembly — recency-biased, budget-bounded history.
//!
//! The window is recomputed from the full stored history on every turn. The
//! system message is exempt from pruning because it encodes the persona and
//! rules required on every call; conversational relevance decays with age, so
//! pruning walks from the most recent message backwards.

use midstream_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pairing::enforce_pairing;
use crate::token;

/// Window bounds. All three are tunables, not derived constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Maximum number of non-system messages to keep.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Approximate token budget for the whole window, system message
    /// included. Estimated with the chars/4 heuristic in [`crate::token`].
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Hard floor: whenever this many non-system messages exist in history,
    /// at least this many are kept, budget notwithstanding.
    #[serde(default = "default_min_messages")]
    pub min_messages: usize,
}

fn default_max_messages() -> usize {
    40
}
fn default_token_budget() -> usize {
    3000
}
fn default_min_messages() -> usize {
    8
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            token_budget: default_token_budget(),
            min_messages: default_min_messages(),
        }
    }
}

/// The context window builder. Stateless — create one and reuse it.
pub struct ContextWindowBuilder {
    config: WindowConfig,
}

impl ContextWindowBuilder {
    /// Create a new builder with the given bounds.
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    /// Create a builder with the default bounds.
    pub fn with_default_config() -> Self {
        Self::new(WindowConfig::default())
    }

    /// Build the window for the next model call.
    ///
    /// # Algorithm
    ///
    /// 1. The system message goes first; its estimate seeds the running total.
    /// 2. Walk the non-system history newest → oldest, accumulating
    ///    estimates; stop once `max_messages` are kept or the next message
    ///    would exceed `token_budget`.
    /// 3. If fewer than `min_messages` were kept and at least that many exist,
    ///    keep exactly the most recent `min_messages` regardless of budget.
    /// 4. Reverse back into chronological order, system message in front.
    /// 5. Apply the pairing filter — this may remove one or two trailing
    ///    messages when pruning split an invocation/outcome pair.
    pub fn build(&self, system: Message, history: &[Message]) -> Vec<Message> {
        let non_system: Vec<&Message> =
            history.iter().filter(|m| m.role != Role::System).collect();

        let mut total = token::estimate_message_tokens(&system);
        let mut kept_newest_first: Vec<&Message> = Vec::new();

        for message in non_system.iter().rev() {
            if kept_newest_first.len() >= self.config.max_messages {
                break;
            }
            let cost = token::estimate_message_tokens(message);
            if total + cost > self.config.token_budget {
                break;
            }
            total += cost;
            kept_newest_first.push(message);
        }

        if kept_newest_first.len() < self.config.min_messages
            && non_system.len() >= self.config.min_messages
        {
            debug!(
                kept = kept_newest_first.len(),
                floor = self.config.min_messages,
                "Token budget starved the window, applying the message floor"
            );
            kept_newest_first = non_system
                .iter()
                .rev()
                .take(self.config.min_messages)
                .copied()
                .collect();
        }

        let mut window = Vec::with_capacity(kept_newest_first.len() + 1);
        window.push(system);
        window.extend(kept_newest_first.into_iter().rev().cloned());

        enforce_pairing(window)
    }
}
