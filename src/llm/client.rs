//! Core LLM client trait.

use async_trait::async_trait;

use crate::error::Result;

/// Stateless text-generation capability: one prompt in, one reply out.
///
/// Each call is an independent round-trip with fresh context. No internal
/// retry; retry policy belongs to the refinement coordinator. Failures
/// (quota, network, malformed reply) surface as
/// `CodeloopError::Generation`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a prompt and return the model's full text reply.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Identifier of the backing model, for provenance and audit.
    fn model(&self) -> &str;
}
