//! No-op sink — disables conversation persistence entirely.

use async_trait::async_trait;
use midstream_core::error::SinkError;
use midstream_core::message::{ConversationId, Message};
use midstream_core::sink::ConversationSink;
use std::sync::atomic::{AtomicU64, Ordering};

/// A no-op sink that stores nothing. Every turn starts from an empty history.
/// Sequence numbers stay monotonic so callers relying on ordering still work.
#[derive(Default)]
pub struct NoopSink {
    seq: AtomicU64,
}

impl NoopSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationSink for NoopSink {
    fn name(&self) -> &str {
        "none"
    }

    async fn append(
        &self,
        _conversation_id: &ConversationId,
        _message: Message,
    ) -> Result<u64, SinkError> {
        Ok(self.seq.fetch_add(1, Ordering::SeqCst))
    }

    async fn load_recent(
        &self,
        _conversation_id: &ConversationId,
        _limit: usize,
    ) -> Result<Vec<Message>, SinkError> {
        Ok(Vec::new())
    }
}
