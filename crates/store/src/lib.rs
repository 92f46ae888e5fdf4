//! Conversation storage backends for midstream.

pub mod in_memory;
pub mod noop;

pub use in_memory::MemorySink;
pub use noop::NoopSink;
