//! The stream decoder — reconstructs a turn from provider chunks.
//!
//! A small state machine consumes the provider's event stream strictly
//! sequentially, accumulating text and tool-invocation arguments. When a tool
//! call completes, the capability is executed synchronously and both the
//! invocation and its outcome are persisted and written downstream *before*
//! the next chunk is read. Text delivery blocks during tool execution — an
//! accepted latency cost in exchange for guaranteed ordering between a tool
//! call and any text that follows it in the provider's stream.

use midstream_core::capability::CapabilityExecutor;
use midstream_core::error::{ProviderError, Result};
use midstream_core::message::{ConversationId, Message, ToolInvocation, ToolOutcome};
use midstream_core::sink::ConversationSink;
use midstream_core::stream::{ChunkStream, StopReason, StreamEvent};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::{EventSink, TurnEvent};

/// Canned user-facing text for provider overload. The real error is logged,
/// never shown.
const OVERLOADED_NOTICE: &str =
    "I'm sorry — I'm experiencing heavy load right now. Please try again in a moment.";

/// Canned user-facing text for any other upstream failure.
const GENERIC_NOTICE: &str =
    "I'm sorry — something went wrong while generating a response. Please try again.";

/// Pick the sanitized notice for an upstream stream failure.
pub fn sanitized_notice(error: &ProviderError) -> &'static str {
    if error.is_overloaded() {
        OVERLOADED_NOTICE
    } else {
        GENERIC_NOTICE
    }
}

/// Generates correlation ids for invocations the provider did not identify.
/// Injected per decode call so tests can script ids and no process-wide
/// counter exists.
pub type CorrelationIdGen = Box<dyn FnMut() -> String + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    AccumulatingText,
    AccumulatingToolArgs,
}

/// A tool invocation that has been opened but not yet finalized.
struct PendingInvocation {
    name: String,
    correlation_id: String,
    argument_buffer: String,
}

/// The decode loop for one conversation turn.
///
/// Owns its text and argument buffers exclusively; the only externally
/// visible mutations are the events written downstream and the messages
/// appended to the sink.
pub struct StreamDecoder<'a> {
    executor: &'a dyn CapabilityExecutor,
    sink: &'a dyn ConversationSink,
    id_gen: CorrelationIdGen,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(executor: &'a dyn CapabilityExecutor, sink: &'a dyn ConversationSink) -> Self {
        Self {
            executor,
            sink,
            id_gen: Box::new(|| Uuid::new_v4().to_string()),
        }
    }

    /// Replace the correlation-id generator used when the provider omits one.
    pub fn with_id_generator(mut self, id_gen: impl FnMut() -> String + Send + 'static) -> Self {
        self.id_gen = Box::new(id_gen);
        self
    }

    /// Consume the chunk stream and return the final accumulated assistant
    /// text.
    ///
    /// Every completed invocation/outcome pair is persisted and written
    /// downstream in stream order. Upstream stream failures are converted to
    /// a single sanitized text event and never propagate; sink failures do.
    /// A closed downstream writer cancels the turn: consumption stops, but a
    /// capability already dispatched completes and both pair messages are
    /// persisted.
    pub async fn decode(
        &mut self,
        conversation_id: &ConversationId,
        mut chunks: ChunkStream,
        writer: &mut dyn EventSink,
    ) -> Result<String> {
        let mut state = DecodeState::Idle;
        let mut text = String::new();
        let mut pending: Option<PendingInvocation> = None;
        let mut cancelled = false;

        while let Some(item) = chunks.recv().await {
            let event = match item {
                Ok(event) => event,
                Err(error) => {
                    warn!(
                        conversation_id = %conversation_id,
                        error = %error,
                        "Provider stream failed mid-turn"
                    );
                    if !cancelled {
                        let notice = sanitized_notice(&error);
                        let _ = writer
                            .write(TurnEvent::TextDelta {
                                content: notice.to_string(),
                            })
                            .await;
                    }
                    break;
                }
            };

            match event {
                StreamEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    if writer
                        .write(TurnEvent::TextDelta { content: delta })
                        .await
                        .is_err()
                    {
                        cancelled = true;
                        break;
                    }
                    state = DecodeState::AccumulatingText;
                }

                StreamEvent::InvocationStarted {
                    name,
                    correlation_id,
                } => {
                    // The provider opened a new tool block before closing the
                    // previous one: finalize what we have first.
                    if let Some(open) = pending.take() {
                        cancelled = self
                            .finalize_invocation(conversation_id, open, writer, cancelled)
                            .await?;
                    }
                    let correlation_id = correlation_id.unwrap_or_else(|| (self.id_gen)());
                    pending = Some(PendingInvocation {
                        name,
                        correlation_id,
                        argument_buffer: String::new(),
                    });
                    state = DecodeState::AccumulatingToolArgs;
                }

                StreamEvent::ArgumentDelta(delta) => {
                    if state == DecodeState::AccumulatingToolArgs {
                        if let Some(open) = &mut pending {
                            open.argument_buffer.push_str(&delta);
                        }
                    } else {
                        trace!("Argument delta outside a tool block, ignoring");
                    }
                }

                StreamEvent::TurnEnded { stop_reason } => {
                    if stop_reason == Some(StopReason::ToolUse)
                        && state == DecodeState::AccumulatingToolArgs
                    {
                        if let Some(open) = pending.take() {
                            cancelled = self
                                .finalize_invocation(conversation_id, open, writer, cancelled)
                                .await?;
                        }
                        state = DecodeState::Idle;
                        if cancelled {
                            break;
                        }
                    } else {
                        if pending.take().is_some() {
                            warn!("Turn ended with an unfinished tool invocation, dropping it");
                        }
                        break;
                    }
                }
            }

            if cancelled {
                break;
            }
        }

        debug!(
            conversation_id = %conversation_id,
            chars = text.len(),
            cancelled,
            "Decode loop finished"
        );
        Ok(text)
    }

    /// Finalize a pending invocation: parse its arguments, persist and emit
    /// the invocation, execute the capability, persist and emit the outcome.
    ///
    /// Returns the updated cancellation flag. Malformed arguments discard the
    /// invocation entirely — no outcome, no downstream event. A capability
    /// failure becomes a `succeeded = false` outcome, never an error.
    async fn finalize_invocation(
        &self,
        conversation_id: &ConversationId,
        open: PendingInvocation,
        writer: &mut dyn EventSink,
        mut cancelled: bool,
    ) -> Result<bool> {
        let arguments = if open.argument_buffer.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(&open.argument_buffer) {
                Ok(value) => value,
                Err(error) => {
                    warn!(
                        tool = %open.name,
                        error = %error,
                        "Discarding tool invocation with malformed arguments"
                    );
                    return Ok(cancelled);
                }
            }
        };

        let invocation = ToolInvocation {
            name: open.name,
            correlation_id: open.correlation_id,
            arguments,
        };

        self.sink
            .append(
                conversation_id,
                Message::invocation(invocation.clone()).in_conversation(conversation_id),
            )
            .await?;
        if !cancelled
            && writer
                .write(TurnEvent::ToolInvocation {
                    name: invocation.name.clone(),
                    correlation_id: invocation.correlation_id.clone(),
                    arguments: invocation.arguments.clone(),
                })
                .await
                .is_err()
        {
            cancelled = true;
        }

        debug!(
            tool = %invocation.name,
            correlation_id = %invocation.correlation_id,
            "Executing capability"
        );
        let outcome = match self
            .executor
            .execute(&invocation.name, &invocation.arguments)
            .await
        {
            Ok(payload) => ToolOutcome {
                correlation_id: invocation.correlation_id.clone(),
                payload,
                succeeded: true,
            },
            Err(error) => {
                warn!(tool = %invocation.name, error = %error, "Capability execution failed");
                ToolOutcome {
                    correlation_id: invocation.correlation_id.clone(),
                    payload: serde_json::json!({ "error": error.to_string() }),
                    succeeded: false,
                }
            }
        };

        self.sink
            .append(
                conversation_id,
                Message::outcome(outcome.clone()).in_conversation(conversation_id),
            )
            .await?;
        if !cancelled
            && writer
                .write(TurnEvent::ToolOutcome {
                    correlation_id: outcome.correlation_id,
                    payload: outcome.payload,
                    succeeded: outcome.succeeded,
                })
                .await
                .is_err()
        {
            cancelled = true;
        }

        Ok(cancelled)
    }
}
