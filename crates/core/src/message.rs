//! Message and conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! user input and decoded assistant output become `Message`s, the sink stores
//! them, and the window builder re-reads them on the next turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (persona, rules)
    System,
}

/// A tool invocation requested by the assistant mid-turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Name of the capability to invoke
    pub name: String,

    /// Unique id linking this invocation to its outcome
    pub correlation_id: String,

    /// Arguments as structured data. Defaults to an empty object, never null.
    #[serde(default = "empty_object")]
    pub arguments: serde_json::Value,
}

/// The outcome of executing a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Matches the `correlation_id` of the invocation this answers
    pub correlation_id: String,

    /// Result payload. May be null when the capability produced nothing.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Whether the capability reported success. Informational only.
    pub succeeded: bool,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Message content — an explicit tagged variant, matched exhaustively
/// wherever content is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text.
    Text { text: String },
    /// A tool invocation the assistant requested.
    ToolInvocation(ToolInvocation),
    /// The outcome of a tool invocation.
    ToolOutcome(ToolOutcome),
}

impl MessageContent {
    /// The text, when this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The invocation, when this is a tool-invocation message.
    pub fn as_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Self::ToolInvocation(inv) => Some(inv),
            _ => None,
        }
    }

    /// The outcome, when this is a tool-outcome message.
    pub fn as_outcome(&self) -> Option<&ToolOutcome> {
        match self {
            Self::ToolOutcome(out) => Some(out),
            _ => None,
        }
    }
}

/// A single message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// What the message carries
    pub content: MessageContent,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Which conversation this belongs to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

impl Message {
    /// Create a new user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create a new assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Create a new system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Create an assistant tool-invocation message.
    pub fn invocation(invocation: ToolInvocation) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolInvocation(invocation),
            timestamp: Utc::now(),
            conversation_id: None,
        }
    }

    /// Create a tool-outcome message. Outcomes travel back to the provider
    /// on the user side of the wire, so they carry the user role.
    pub fn outcome(outcome: ToolOutcome) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::ToolOutcome(outcome),
            timestamp: Utc::now(),
            conversation_id: None,
        }
    }

    /// Attach a conversation id.
    pub fn in_conversation(mut self, id: &ConversationId) -> Self {
        self.conversation_id = Some(id.clone());
        self
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text { text: text.into() },
            timestamp: Utc::now(),
            conversation_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content.as_text(), Some("Hello, agent!"));
        assert!(msg.conversation_id.is_none());
    }

    #[test]
    fn invocation_message_is_assistant() {
        let msg = Message::invocation(ToolInvocation {
            name: "lookup".into(),
            correlation_id: "t1".into(),
            arguments: serde_json::json!({"query": "cats"}),
        });
        assert_eq!(msg.role, Role::Assistant);
        let inv = msg.content.as_invocation().unwrap();
        assert_eq!(inv.name, "lookup");
        assert_eq!(inv.arguments["query"], "cats");
    }

    #[test]
    fn outcome_message_is_user() {
        let msg = Message::outcome(ToolOutcome {
            correlation_id: "t1".into(),
            payload: serde_json::Value::Null,
            succeeded: true,
        });
        assert_eq!(msg.role, Role::User);
        assert!(msg.content.as_outcome().unwrap().succeeded);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("Test message").in_conversation(&ConversationId::from("c1"));
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, msg);
    }

    #[test]
    fn content_is_tagged() {
        let msg = Message::invocation(ToolInvocation {
            name: "lookup".into(),
            correlation_id: "t1".into(),
            arguments: serde_json::json!({}),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""kind":"tool_invocation""#));
    }

    #[test]
    fn missing_arguments_default_to_empty_object() {
        let inv: ToolInvocation =
            serde_json::from_str(r#"{"name":"lookup","correlation_id":"t1"}"#).unwrap();
        assert_eq!(inv.arguments, serde_json::json!({}));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let out: ToolOutcome =
            serde_json::from_str(r#"{"correlation_id":"t1","succeeded":false}"#).unwrap();
        assert!(out.payload.is_null());
    }
}
