//! Anthropic native chunk source.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, translated into flat [`StreamEvent`]s

use async_trait::async_trait;
use futures::StreamExt;
use midstream_core::capability::CapabilityDefinition;
use midstream_core::error::ProviderError;
use midstream_core::message::{Message, MessageContent, Role};
use midstream_core::stream::{ChunkSource, ChunkStream, StopReason, StreamEvent, TurnRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API chunk source.
pub struct AnthropicChunkSource {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicChunkSource {
    /// Create a new Anthropic chunk source.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Extract system messages from the message list.
    /// Anthropic puts the system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match (msg.role, &msg.content) {
                (Role::System, MessageContent::Text { text }) => system_parts.push(text),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|msg| match &msg.content {
                MessageContent::Text { text } => AnthropicMessage {
                    role: match msg.role {
                        Role::Assistant => "assistant".into(),
                        _ => "user".into(),
                    },
                    content: AnthropicContent::Text(text.clone()),
                },
                MessageContent::ToolInvocation(inv) => AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Blocks(vec![ContentBlock::ToolUse {
                        id: inv.correlation_id.clone(),
                        name: inv.name.clone(),
                        input: inv.arguments.clone(),
                    }]),
                },
                // Tool results go back on the user side of the wire.
                MessageContent::ToolOutcome(out) => AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: out.correlation_id.clone(),
                        content: serde_json::to_string(&out.payload).unwrap_or_default(),
                        is_error: !out.succeeded,
                    }]),
                },
            })
            .collect()
    }

    /// Convert capability definitions to Anthropic tool format.
    fn to_api_tools(capabilities: &[CapabilityDefinition]) -> Vec<AnthropicTool> {
        capabilities
            .iter()
            .map(|c| AnthropicTool {
                name: c.name.clone(),
                description: c.description.clone(),
                input_schema: c.parameters.clone(),
            })
            .collect()
    }

    /// Map a non-200 status to the provider error taxonomy.
    fn status_error(status: u16, body: String) -> ProviderError {
        if status == 429 {
            return ProviderError::RateLimited {
                retry_after_secs: 5,
            };
        }
        if status == 401 || status == 403 {
            return ProviderError::AuthenticationFailed("Invalid Anthropic API key".into());
        }
        if status == 529 || body.to_lowercase().contains("overload") {
            return ProviderError::Overloaded(body);
        }
        ProviderError::ApiError {
            status_code: status,
            message: body,
        }
    }
}

/// Translate one parsed SSE data event into flat stream events.
///
/// Unknown event and delta types map to nothing; the wire format grows new
/// event types without notice and they must not break decoding. The final
/// `message_stop` maps to `TurnEnded` with the end-turn stop reason; the
/// `message_delta` that announces `tool_use` maps to `TurnEnded` too, which
/// is what tells the decoder to finalize the pending invocation.
fn map_sse_event(event: &serde_json::Value) -> Vec<StreamEvent> {
    match event["type"].as_str().unwrap_or("") {
        "content_block_start" => {
            let block = &event["content_block"];
            if block["type"].as_str() == Some("tool_use") {
                let name = block["name"].as_str().unwrap_or("").to_string();
                let correlation_id = block["id"].as_str().map(String::from);
                return vec![StreamEvent::InvocationStarted {
                    name,
                    correlation_id,
                }];
            }
            vec![]
        }
        "content_block_delta" => {
            let delta = &event["delta"];
            match delta["type"].as_str().unwrap_or("") {
                "text_delta" => delta["text"]
                    .as_str()
                    .map(|t| vec![StreamEvent::TextDelta(t.to_string())])
                    .unwrap_or_default(),
                "input_json_delta" => delta["partial_json"]
                    .as_str()
                    .map(|j| vec![StreamEvent::ArgumentDelta(j.to_string())])
                    .unwrap_or_default(),
                _ => vec![],
            }
        }
        "message_delta" => {
            // Only tool_use matters here; end_turn arrives via message_stop.
            if event["delta"]["stop_reason"].as_str() == Some("tool_use") {
                return vec![StreamEvent::TurnEnded {
                    stop_reason: Some(StopReason::ToolUse),
                }];
            }
            vec![]
        }
        "message_stop" => vec![StreamEvent::TurnEnded {
            stop_reason: Some(StopReason::EndTurn),
        }],
        _ => vec![],
    }
}

#[async_trait]
impl ChunkSource for AnthropicChunkSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> std::result::Result<ChunkStream, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);

        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.capabilities.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.capabilities));
        }

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // only data lines carry payloads; "event:" lines repeat
                    // the type field inside the data
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() {
                        continue;
                    }

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    let ended = event["type"].as_str() == Some("message_stop");
                    for mapped in map_sse_event(&event) {
                        if tx.send(Ok(mapped)).await.is_err() {
                            return;
                        }
                    }
                    if ended {
                        return;
                    }
                }
            }

            // Stream ended without message_stop; close the turn anyway so the
            // decoder never hangs on a truncated stream.
            let _ = tx
                .send(Ok(StreamEvent::TurnEnded { stop_reason: None }))
                .await;
        });

        Ok(rx)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use midstream_core::message::{ToolInvocation, ToolOutcome};

    #[test]
    fn constructor() {
        let source = AnthropicChunkSource::new("sk-ant-test");
        assert_eq!(source.name(), "anthropic");
        assert_eq!(source.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let source =
            AnthropicChunkSource::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(source.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn system_extraction() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::system("Be concise"),
            Message::user("Hello"),
            Message::assistant("Hi!"),
        ];

        let (system, non_system) = AnthropicChunkSource::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nBe concise"));
        assert_eq!(non_system.len(), 2);
        assert_eq!(non_system[0].role, Role::User);
        assert_eq!(non_system[1].role, Role::Assistant);
    }

    #[test]
    fn system_extraction_no_system() {
        let messages = vec![Message::user("Hello")];
        let (system, non_system) = AnthropicChunkSource::extract_system(&messages);
        assert!(system.is_none());
        assert_eq!(non_system.len(), 1);
    }

    #[test]
    fn message_conversion_user_assistant() {
        let messages = vec![Message::user("Hello"), Message::assistant("Hi!")];
        let refs: Vec<&Message> = messages.iter().collect();
        let api_msgs = AnthropicChunkSource::to_api_messages(&refs);
        assert_eq!(api_msgs.len(), 2);
        assert_eq!(api_msgs[0].role, "user");
        assert_eq!(api_msgs[1].role, "assistant");
    }

    #[test]
    fn invocation_becomes_tool_use_block() {
        let msg = Message::invocation(ToolInvocation {
            name: "web_search".into(),
            correlation_id: "toolu_123".into(),
            arguments: serde_json::json!({"query": "rust"}),
        });

        let refs: Vec<&Message> = vec![&msg];
        let api_msgs = AnthropicChunkSource::to_api_messages(&refs);
        assert_eq!(api_msgs[0].role, "assistant");

        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolUse { id, name, input } => {
                    assert_eq!(id, "toolu_123");
                    assert_eq!(name, "web_search");
                    assert_eq!(input["query"], "rust");
                }
                other => panic!("Expected tool_use block, got {other:?}"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn outcome_becomes_tool_result_block() {
        let msg = Message::outcome(ToolOutcome {
            correlation_id: "toolu_123".into(),
            payload: serde_json::json!({"result": "ok"}),
            succeeded: false,
        });

        let refs: Vec<&Message> = vec![&msg];
        let api_msgs = AnthropicChunkSource::to_api_messages(&refs);
        assert_eq!(api_msgs[0].role, "user");

        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    assert_eq!(tool_use_id, "toolu_123");
                    assert!(content.contains("ok"));
                    assert!(is_error);
                }
                other => panic!("Expected tool_result block, got {other:?}"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn capability_definition_conversion() {
        let caps = vec![CapabilityDefinition {
            name: "calculator".into(),
            description: "Evaluate math".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "expression": {"type": "string"}
                },
                "required": ["expression"]
            }),
        }];
        let api_tools = AnthropicChunkSource::to_api_tools(&caps);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].name, "calculator");
        assert_eq!(api_tools[0].input_schema["type"].as_str(), Some("object"));
    }

    #[test]
    fn text_delta_maps_to_text_event() {
        let event = serde_json::json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "Hello"}
        });
        assert_eq!(
            map_sse_event(&event),
            vec![StreamEvent::TextDelta("Hello".into())]
        );
    }

    #[test]
    fn tool_use_start_maps_to_invocation_started() {
        let event = serde_json::json!({
            "type": "content_block_start",
            "content_block": {"type": "tool_use", "id": "toolu_abc", "name": "calculator"}
        });
        assert_eq!(
            map_sse_event(&event),
            vec![StreamEvent::InvocationStarted {
                name: "calculator".into(),
                correlation_id: Some("toolu_abc".into()),
            }]
        );
    }

    #[test]
    fn text_block_start_maps_to_nothing() {
        let event = serde_json::json!({
            "type": "content_block_start",
            "content_block": {"type": "text", "text": ""}
        });
        assert!(map_sse_event(&event).is_empty());
    }

    #[test]
    fn input_json_delta_maps_to_argument_delta() {
        let event = serde_json::json!({
            "type": "content_block_delta",
            "delta": {"type": "input_json_delta", "partial_json": "{\"expr\":"}
        });
        assert_eq!(
            map_sse_event(&event),
            vec![StreamEvent::ArgumentDelta("{\"expr\":".into())]
        );
    }

    #[test]
    fn tool_use_stop_reason_ends_the_turn() {
        let event = serde_json::json!({
            "type": "message_delta",
            "delta": {"stop_reason": "tool_use"}
        });
        assert_eq!(
            map_sse_event(&event),
            vec![StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::ToolUse),
            }]
        );
    }

    #[test]
    fn end_turn_arrives_only_via_message_stop() {
        let delta = serde_json::json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"}
        });
        assert!(map_sse_event(&delta).is_empty());

        let stop = serde_json::json!({"type": "message_stop"});
        assert_eq!(
            map_sse_event(&stop),
            vec![StreamEvent::TurnEnded {
                stop_reason: Some(StopReason::EndTurn),
            }]
        );
    }

    #[test]
    fn unknown_event_types_map_to_nothing() {
        for raw in [
            serde_json::json!({"type": "message_start", "message": {}}),
            serde_json::json!({"type": "ping"}),
            serde_json::json!({"type": "content_block_stop", "index": 0}),
            serde_json::json!({"type": "some_future_event"}),
        ] {
            assert!(map_sse_event(&raw).is_empty(), "{raw}");
        }
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            AnthropicChunkSource::status_error(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            AnthropicChunkSource::status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            AnthropicChunkSource::status_error(529, String::new()),
            ProviderError::Overloaded(_)
        ));
        assert!(matches!(
            AnthropicChunkSource::status_error(
                500,
                r#"{"error":{"type":"overloaded_error"}}"#.into()
            ),
            ProviderError::Overloaded(_)
        ));
        assert!(matches!(
            AnthropicChunkSource::status_error(400, "bad request".into()),
            ProviderError::ApiError {
                status_code: 400,
                ..
            }
        ));
    }
}
