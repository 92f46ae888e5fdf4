//! Error types for the midstream domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all midstream operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Sink errors ---
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Domain invariant violations ---
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider overloaded: {0}")]
    Overloaded(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this error indicates provider overload rather than a generic
    /// failure. Classification is by message-substring sniffing: providers
    /// report overload inconsistently across transports, so the error text is
    /// the only reliable signal.
    pub fn is_overloaded(&self) -> bool {
        match self {
            Self::Overloaded(_) | Self::RateLimited { .. } => true,
            other => other.to_string().to_lowercase().contains("overload"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Capability execution failed: {name} — {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Invalid capability arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
}
