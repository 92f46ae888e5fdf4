//! The turn runner — wires one full conversation turn together.
//!
//! history → window builder → provider call → stream decoder → persisted
//! messages → next turn's history. Each conversation's turn is independent;
//! the only shared collaborator is the sink, which owns per-conversation
//! sequencing.

use std::sync::Arc;

use midstream_core::capability::CapabilityExecutor;
use midstream_core::error::{Error, Result};
use midstream_core::message::{ConversationId, Message};
use midstream_core::persona::PersonaSupplier;
use midstream_core::sink::ConversationSink;
use midstream_core::stream::{ChunkSource, TurnRequest};
use tracing::{debug, info, warn};

use crate::decoder::{StreamDecoder, sanitized_notice};
use crate::event::{EventSink, TurnEvent};
use crate::window::{ContextWindowBuilder, WindowConfig};

/// Orchestrates LLM calls and tool execution for one conversation at a time.
pub struct TurnRunner {
    /// The provider chunk source
    source: Arc<dyn ChunkSource>,

    /// Executes tool invocations
    executor: Arc<dyn CapabilityExecutor>,

    /// The durable message store
    sink: Arc<dyn ConversationSink>,

    /// Supplies the per-conversation system message
    persona: Arc<dyn PersonaSupplier>,

    /// Assembles the bounded history for each call
    window: ContextWindowBuilder,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// How much stored history to consider for the window
    history_limit: usize,
}

impl TurnRunner {
    /// Create a new turn runner with default window bounds.
    pub fn new(
        source: Arc<dyn ChunkSource>,
        executor: Arc<dyn CapabilityExecutor>,
        sink: Arc<dyn ConversationSink>,
        persona: Arc<dyn PersonaSupplier>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            source,
            executor,
            sink,
            persona,
            window: ContextWindowBuilder::with_default_config(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            history_limit: 200,
        }
    }

    /// Set the window bounds.
    pub fn with_window_config(mut self, config: WindowConfig) -> Self {
        self.window = ContextWindowBuilder::new(config);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set how many stored messages are loaded as window input.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Process one user message and stream the response to `writer`.
    ///
    /// Returns the final assistant text. The user message, every completed
    /// tool pair, and the final assistant text are all appended to the sink.
    pub async fn run_turn(
        &self,
        conversation_id: &ConversationId,
        user_text: &str,
        writer: &mut dyn EventSink,
    ) -> Result<String> {
        if user_text.trim().is_empty() {
            return Err(Error::InvalidMessage(
                "user message content must not be empty".into(),
            ));
        }

        info!(conversation_id = %conversation_id, "Processing turn");

        self.sink
            .append(
                conversation_id,
                Message::user(user_text).in_conversation(conversation_id),
            )
            .await?;

        let history = self
            .sink
            .load_recent(conversation_id, self.history_limit)
            .await?;
        let system = Message::system(self.persona.system_text(conversation_id));
        let window = self.window.build(system, &history);
        debug!(
            conversation_id = %conversation_id,
            messages = window.len(),
            "Built conversation window"
        );

        let request = TurnRequest {
            model: self.model.clone(),
            messages: window,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            capabilities: self.executor.definitions(),
        };

        // A failure to even open the stream gets the same treatment as a
        // mid-stream failure: one sanitized notice, nothing propagated.
        let chunks = match self.source.stream_turn(request).await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "Provider refused the streaming request"
                );
                let _ = writer
                    .write(TurnEvent::TextDelta {
                        content: sanitized_notice(&error).to_string(),
                    })
                    .await;
                return Ok(String::new());
            }
        };

        let mut decoder =
            StreamDecoder::new(self.executor.as_ref(), self.sink.as_ref());
        let text = decoder.decode(conversation_id, chunks, writer).await?;

        // The non-empty-content invariant holds at the sink boundary: a turn
        // that produced only tool calls appends no assistant text message.
        if !text.trim().is_empty() {
            self.sink
                .append(
                    conversation_id,
                    Message::assistant(text.clone()).in_conversation(conversation_id),
                )
                .await?;
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use midstream_core::capability::CapabilityDefinition;
    use midstream_core::error::{CapabilityError, ProviderError};
    use midstream_core::persona::StaticPersona;
    use midstream_core::stream::{ChunkStream, StopReason, StreamEvent};
    use midstream_store::MemorySink;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::event::WriterClosed;

    struct RecordingWriter {
        events: Vec<TurnEvent>,
    }

    #[async_trait]
    impl EventSink for RecordingWriter {
        async fn write(&mut self, event: TurnEvent) -> std::result::Result<(), WriterClosed> {
            self.events.push(event);
            Ok(())
        }
    }

    /// Replays a scripted event list and records the request it was sent.
    struct ScriptedSource {
        script: Vec<StreamEvent>,
        seen_request: Mutex<Option<TurnRequest>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<StreamEvent>) -> Self {
            Self {
                script,
                seen_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_turn(
            &self,
            request: TurnRequest,
        ) -> std::result::Result<ChunkStream, ProviderError> {
            *self.seen_request.lock().unwrap() = Some(request);
            let (tx, rx) = mpsc::channel(self.script.len().max(1));
            for event in self.script.clone() {
                tx.send(Ok(event)).await.map_err(|_| {
                    ProviderError::StreamInterrupted("script receiver dropped".into())
                })?;
            }
            Ok(rx)
        }
    }

    /// Refuses every request.
    struct RefusingSource;

    #[async_trait]
    impl ChunkSource for RefusingSource {
        fn name(&self) -> &str {
            "refusing"
        }

        async fn stream_turn(
            &self,
            _request: TurnRequest,
        ) -> std::result::Result<ChunkStream, ProviderError> {
            Err(ProviderError::Overloaded("529".into()))
        }
    }

    struct NoCapabilities;

    #[async_trait]
    impl CapabilityExecutor for NoCapabilities {
        async fn execute(
            &self,
            name: &str,
            _arguments: &serde_json::Value,
        ) -> std::result::Result<serde_json::Value, CapabilityError> {
            Err(CapabilityError::NotFound(name.into()))
        }

        fn definitions(&self) -> Vec<CapabilityDefinition> {
            vec![]
        }
    }

    fn runner(source: Arc<dyn ChunkSource>, sink: Arc<MemorySink>) -> TurnRunner {
        TurnRunner::new(
            source,
            Arc::new(NoCapabilities),
            sink,
            Arc::new(StaticPersona::new("You are a helpful assistant.")),
            "claude-sonnet-4-20250514",
        )
    }

    #[tokio::test]
    async fn full_text_turn_persists_both_sides() {
        let source = Arc::new(ScriptedSource::new(vec![
            StreamEvent::TextDelta("Hello! ".into()),
            StreamEvent::TextDelta("How can I help?".into()),
            StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::EndTurn),
            },
        ]));
        let sink = Arc::new(MemorySink::new());
        let mut writer = RecordingWriter { events: vec![] };

        let id = ConversationId::from("c1");
        let text = runner(source.clone(), sink.clone())
            .run_turn(&id, "Hello!", &mut writer)
            .await
            .unwrap();

        assert_eq!(text, "Hello! How can I help?");
        let stored = sink.load_recent(&id, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content.as_text(), Some("Hello!"));
        assert_eq!(stored[1].content.as_text(), Some("Hello! How can I help?"));

        // the provider saw a window with the persona first
        let request = source.seen_request.lock().unwrap().take().unwrap();
        assert_eq!(
            request.messages[0].content.as_text(),
            Some("You are a helpful assistant.")
        );
        assert_eq!(request.model, "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn empty_user_text_is_rejected() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let sink = Arc::new(MemorySink::new());
        let mut writer = RecordingWriter { events: vec![] };

        let id = ConversationId::from("c1");
        let err = runner(source, sink.clone())
            .run_turn(&id, "   ", &mut writer)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidMessage(_)));
        assert!(sink.load_recent(&id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refused_request_yields_sanitized_notice() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = RecordingWriter { events: vec![] };

        let id = ConversationId::from("c1");
        let text = runner(Arc::new(RefusingSource), sink.clone())
            .run_turn(&id, "Hello!", &mut writer)
            .await
            .unwrap();

        assert_eq!(text, "");
        assert_eq!(writer.events.len(), 1);
        match &writer.events[0] {
            TurnEvent::TextDelta { content } => assert!(content.contains("heavy load")),
            other => panic!("expected sanitized text, got {other:?}"),
        }
        // the user message is still persisted; no assistant text is
        let stored = sink.load_recent(&id, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn tool_only_turn_appends_no_assistant_text() {
        let source = Arc::new(ScriptedSource::new(vec![
            StreamEvent::InvocationStarted {
                name: "lookup".into(),
                correlation_id: Some("t1".into()),
            },
            StreamEvent::ArgumentDelta("{}".into()),
            StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::ToolUse),
            },
            StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::EndTurn),
            },
        ]));
        let sink = Arc::new(MemorySink::new());
        let mut writer = RecordingWriter { events: vec![] };

        let id = ConversationId::from("c1");
        let text = runner(source, sink.clone())
            .run_turn(&id, "look it up", &mut writer)
            .await
            .unwrap();

        assert_eq!(text, "");
        let stored = sink.load_recent(&id, 10).await.unwrap();
        // user + invocation + outcome, no assistant text
        assert_eq!(stored.len(), 3);
        assert!(stored[1].content.as_invocation().is_some());
        assert!(stored[2].content.as_outcome().is_some());
    }

    #[tokio::test]
    async fn second_turn_window_carries_prior_pair() {
        let first = Arc::new(ScriptedSource::new(vec![
            StreamEvent::InvocationStarted {
                name: "lookup".into(),
                correlation_id: Some("t1".into()),
            },
            StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::ToolUse),
            },
            StreamEvent::TextDelta("found it".into()),
            StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::EndTurn),
            },
        ]));
        let sink = Arc::new(MemorySink::new());
        let id = ConversationId::from("c1");
        let mut writer = RecordingWriter { events: vec![] };

        runner(first, sink.clone())
            .run_turn(&id, "look it up", &mut writer)
            .await
            .unwrap();

        let second = Arc::new(ScriptedSource::new(vec![
            StreamEvent::TextDelta("you're welcome".into()),
            StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::EndTurn),
            },
        ]));
        runner(second.clone(), sink.clone())
            .run_turn(&id, "thanks", &mut writer)
            .await
            .unwrap();

        let request = second.seen_request.lock().unwrap().take().unwrap();
        // system + user + invocation + outcome + assistant + user
        assert_eq!(request.messages.len(), 6);
        assert!(request.messages[2].content.as_invocation().is_some());
        assert!(request.messages[3].content.as_outcome().is_some());
    }
}
