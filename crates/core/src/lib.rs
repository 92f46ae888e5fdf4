//! # midstream Core
//!
//! Domain types, traits, and error definitions for the midstream turn engine.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the provider chunk
//! source, the capability executor, the conversation sink, the persona
//! supplier. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod capability;
pub mod error;
pub mod message;
pub mod persona;
pub mod sink;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use capability::{
    Capability, CapabilityDefinition, CapabilityExecutor, CapabilityRegistry,
};
pub use error::{CapabilityError, Error, ProviderError, Result, SinkError};
pub use message::{ConversationId, Message, MessageContent, Role, ToolInvocation, ToolOutcome};
pub use persona::{PersonaSupplier, StaticPersona};
pub use sink::ConversationSink;
pub use stream::{ChunkSource, ChunkStream, StopReason, StreamEvent, TurnRequest};
