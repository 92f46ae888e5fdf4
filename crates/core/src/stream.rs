//! Provider chunk stream contract.
//!
//! A `ChunkSource` knows how to send a conversation window to an LLM backend
//! and deliver the response as an ordered sequence of `StreamEvent`s. The
//! exact provider wire format is an implementation detail; only the four
//! cases below are consumed by the decoder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityDefinition;
use crate::error::ProviderError;
use crate::message::Message;

/// Why the provider ended a turn (or a segment of one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The assistant finished its response.
    EndTurn,
    /// The assistant stopped to have a tool call executed.
    ToolUse,
}

/// A single chunk in a streaming response. Transient — never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),

    /// The assistant opened a tool invocation. Providers usually supply the
    /// correlation id; when absent the decoder generates one locally.
    InvocationStarted {
        name: String,
        correlation_id: Option<String>,
    },

    /// A fragment of the pending invocation's JSON arguments.
    ArgumentDelta(String),

    /// The provider signalled the end of a turn segment.
    TurnEnded { stop_reason: Option<StopReason> },
}

/// Configuration for a streaming turn request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation window, system message first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Capabilities the model may invoke
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// The channel a chunk source delivers events on. Errors arrive in-band so
/// the decoder can convert them to a sanitized notice instead of aborting.
pub type ChunkStream = tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// The provider chunk source trait.
///
/// The decode loop consumes the returned receiver strictly sequentially; the
/// source side is free to parse ahead, but events must be sent in provider
/// order.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// A human-readable name for this source (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response events.
    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> std::result::Result<ChunkStream, ProviderError>;
}
