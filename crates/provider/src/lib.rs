//! Provider chunk-source implementations for midstream.

pub mod anthropic;

pub use anthropic::AnthropicChunkSource;
