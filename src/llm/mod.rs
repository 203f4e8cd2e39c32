//! LLM client abstraction and backends.
//!
//! The generator is polymorphic over a single-method capability: send a
//! prompt, get a reply. Any backend that can do that plugs in without the
//! coordinator noticing.

pub mod anthropic;
pub mod client;
pub mod mock;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::LlmClient;
pub use mock::MockLlmClient;
