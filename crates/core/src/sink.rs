//! Conversation sink — the durable, append-only message store seam.
//!
//! The sink owns the per-conversation sequencing discipline: `append` assigns
//! monotonically increasing sequence numbers within a conversation, which is
//! what makes concurrent turns across conversations safe without any shared
//! state in the decode loop itself.

use async_trait::async_trait;

use crate::error::SinkError;
use crate::message::{ConversationId, Message};

/// The durable message store. Messages are appended once and never mutated.
#[async_trait]
pub trait ConversationSink: Send + Sync {
    /// A human-readable name for this sink (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Append a message, returning its assigned per-conversation sequence
    /// number.
    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> std::result::Result<u64, SinkError>;

    /// Load the most recent `limit` messages for a conversation, in
    /// chronological order. Unknown conversations yield an empty history.
    async fn load_recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, SinkError>;
}
