//! # midstream Turn
//!
//! The streaming turn engine: reconstructs tool invocations from a chunked
//! provider event stream, executes them in stream order, and assembles the
//! bounded conversation window for the next model call.
//!
//! Components:
//! - [`decoder::StreamDecoder`] — the chunk-stream state machine
//! - [`window::ContextWindowBuilder`] — recency-biased, budget-bounded history
//! - [`pairing`] — the invocation/outcome adjacency filter
//! - [`token`] — the character-heuristic token estimator
//! - [`runner::TurnRunner`] — wires one full turn together

pub mod decoder;
pub mod event;
pub mod pairing;
pub mod runner;
pub mod token;
pub mod window;

// Re-export key types at crate root for ergonomics
pub use decoder::StreamDecoder;
pub use event::{EventSink, TurnEvent, WriterClosed};
pub use pairing::enforce_pairing;
pub use runner::TurnRunner;
pub use window::{ContextWindowBuilder, WindowConfig};
