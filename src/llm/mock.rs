//! Scripted mock client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CodeloopError, Result};
use crate::llm::client::LlmClient;

/// Mock LLM client that replays a scripted sequence of responses.
///
/// Records every prompt it receives so tests can assert on what was sent.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// Create a mock that returns the given responses in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor from string slices.
    pub fn from_slices(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|s| s.to_string()).collect())
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of completions served.
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CodeloopError::Generation("mock responses exhausted".to_string()))
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
