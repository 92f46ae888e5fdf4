//! Client-facing turn events.
//!
//! `TurnEvent` is what the decode loop writes downstream while a turn is in
//! flight, ready to be forwarded to clients over SSE or WebSocket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Events emitted by the decode loop during streaming execution.
///
/// - `text_delta`      — partial assistant text
/// - `tool_invocation` — a completed tool invocation (informational: the
///   decode loop has already executed it — receivers must not re-execute)
/// - `tool_outcome`    — the result of that invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Partial assistant text.
    TextDelta { content: String },

    /// The assistant invoked a tool.
    ToolInvocation {
        name: String,
        correlation_id: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed.
    ToolOutcome {
        correlation_id: String,
        payload: serde_json::Value,
        succeeded: bool,
    },
}

impl TurnEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::ToolOutcome { .. } => "tool_outcome",
        }
    }
}

/// The downstream writer reported closure — the caller went away. The decode
/// loop treats this as cancellation: stop consuming, stop writing.
#[derive(Debug, thiserror::Error)]
#[error("downstream writer closed")]
pub struct WriterClosed;

/// The caller-facing output sink. Writes are awaited, so a slow consumer
/// applies backpressure to the decode loop.
#[async_trait]
pub trait EventSink: Send {
    async fn write(&mut self, event: TurnEvent) -> std::result::Result<(), WriterClosed>;
}
