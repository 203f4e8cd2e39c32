//! Code generation: single model round-trips and reply extraction.
//!
//! One request/response per call, no internal retry. The generator pulls
//! the first fenced code block out of the reply; pathological output is
//! left for the safety validator to reject through its parse-error path
//! rather than guessed at here.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use regex::Regex;

use crate::audit::AuditStore;
use crate::error::{CodeloopError, Result};
use crate::llm::LlmClient;
use crate::prompt::loader::{FEEDBACK, GENERATE, TESTGEN};
use crate::prompt::{PromptLoader, PromptRenderer};
use crate::sandbox::IMPL_MODULE;

/// Configuration for the code generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Fence tag of the target language in model replies.
    pub language_tag: String,

    /// Credential env var injected by the test preamble so generated tests
    /// never perform live calls.
    pub credential_env: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            language_tag: "python".to_string(),
            credential_env: "API_KEY".to_string(),
        }
    }
}

/// Wraps an LLM client with prompt templates and reply extraction.
pub struct CodeGenerator<L: LlmClient> {
    llm: Arc<L>,
    loader: Arc<PromptLoader>,
    renderer: PromptRenderer,
    config: GeneratorConfig,
    audit: Option<Arc<AuditStore>>,
    fence: Regex,
}

impl<L: LlmClient> CodeGenerator<L> {
    pub fn new(llm: Arc<L>, loader: Arc<PromptLoader>, config: GeneratorConfig) -> Self {
        // First fenced block tagged with the target language
        let fence = Regex::new(&format!(
            r"(?s)```{}\n(.*?)```",
            regex::escape(&config.language_tag)
        ))
        .expect("static fence pattern");

        Self {
            llm,
            loader,
            renderer: PromptRenderer::new(),
            config,
            audit: None,
            fence,
        }
    }

    /// Attach an audit store; every round-trip is recorded there.
    pub fn with_audit(mut self, audit: Arc<AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Model identifier of the backing client.
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Render the initial generation prompt for a task.
    pub fn initial_prompt(&self, task: &str, metaprompt: &str) -> Result<String> {
        let template = self.loader.load(GENERATE)?;
        self.renderer.render(
            &template,
            &context(&[("task", task), ("metaprompt", metaprompt)]),
        )
    }

    /// Render the feedback prompt embedding the previous candidate and its
    /// failure summary.
    pub fn feedback_prompt(&self, task: &str, code: &str, error_summary: &str) -> Result<String> {
        let template = self.loader.load(FEEDBACK)?;
        self.renderer.render(
            &template,
            &context(&[
                ("task", task),
                ("code", code),
                ("error_feedback", error_summary),
            ]),
        )
    }

    /// One round-trip: send the prompt, extract the candidate source.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("generating code, prompt length {}", prompt.len());
        let reply = self.llm.complete(prompt).await?;
        self.record(prompt, &reply);

        let code = self.extract_code(&reply);
        if code.is_empty() {
            // An empty candidate must never silently proceed to execution
            return Err(CodeloopError::Generation(
                "model returned an empty response".to_string(),
            ));
        }
        Ok(code)
    }

    /// Generate a test suite for a candidate, with the fixture preamble
    /// prepended.
    pub async fn generate_tests(&self, task: &str, code: &str) -> Result<String> {
        let template = self.loader.load(TESTGEN)?;
        let prompt = self
            .renderer
            .render(&template, &context(&[("task", task), ("code", code)]))?;

        let body = self.generate(&prompt).await?;
        Ok(format!("{}{}", self.test_preamble(), body))
    }

    /// Extract the first fenced code block tagged as the target language;
    /// fall back to the full trimmed reply when no fence is present.
    fn extract_code(&self, reply: &str) -> String {
        match self.fence.captures(reply) {
            Some(caps) => caps[1].trim().to_string(),
            None => {
                warn!(
                    "no {} code block found in response, using full text",
                    self.config.language_tag
                );
                reply.trim().to_string()
            }
        }
    }

    /// Fixed preamble establishing process-wide fixtures: mock credentials
    /// and the import of the implementation module.
    fn test_preamble(&self) -> String {
        format!(
            r#"import pytest
import os
from unittest.mock import MagicMock, patch

if "{env}" not in os.environ:
    os.environ["{env}"] = "mock-credential-for-testing"

from {module} import *

"#,
            env = self.config.credential_env,
            module = IMPL_MODULE,
        )
    }

    fn record(&self, prompt: &str, reply: &str) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.record_response(self.llm.model(), prompt, reply)
        {
            warn!("failed to audit model response: {}", e);
        }
    }
}

fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
