//! In-memory sink — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use midstream_core::error::SinkError;
use midstream_core::message::{ConversationId, Message};
use midstream_core::sink::ConversationSink;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// An in-memory sink that keeps each conversation as a Vec in append order.
/// Useful for testing and sessions where persistence isn't needed.
pub struct MemorySink {
    conversations: Arc<RwLock<HashMap<String, Vec<(u64, Message)>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of messages stored for a conversation.
    pub async fn len(&self, conversation_id: &ConversationId) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id.as_str())
            .map_or(0, Vec::len)
    }

    /// Drop every stored conversation.
    pub async fn clear(&self) {
        self.conversations.write().await.clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationSink for MemorySink {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<u64, SinkError> {
        let mut conversations = self.conversations.write().await;
        let entries = conversations
            .entry(conversation_id.as_str().to_string())
            .or_default();
        // sequence numbers are per conversation and never reused
        let seq = entries.last().map_or(0, |(s, _)| s + 1);
        trace!(conversation_id = %conversation_id, seq, "Appending message");
        entries.push((seq, message));
        Ok(seq)
    }

    async fn load_recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, SinkError> {
        let conversations = self.conversations.read().await;
        let Some(entries) = conversations.get(conversation_id.as_str()) else {
            return Ok(Vec::new());
        };
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.iter().skip(skip).map(|(_, m)| m.clone()).collect())
    }
}
