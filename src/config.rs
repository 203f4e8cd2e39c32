//! Binary-side configuration.
//!
//! Loaded from ~/.config/codeloop/codeloop.yml or .codeloop.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use codeloop::llm::AnthropicConfig;
use codeloop::refine::RefineConfig;
use codeloop::safety::SafetyConfig;
use codeloop::sandbox::ExecutorConfig;

/// Top-level configuration for codeloop.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider settings.
    pub llm: LlmSection,

    /// Code generation settings.
    pub generator: GeneratorSection,

    /// Sandbox execution settings.
    pub executor: ExecutorSection,

    /// Refinement loop settings.
    pub refine: RefineSection,

    /// Metaprompt cache settings.
    pub metaprompt: MetapromptSection,

    /// Audit trail settings.
    pub audit: AuditSection,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .codeloop.yml in current directory
    /// 3. ~/.config/codeloop/codeloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".codeloop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .codeloop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .codeloop.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("codeloop").join("codeloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refine.max_iterations == 0 {
            eyre::bail!("refine.max-iterations must be > 0");
        }
        if self.executor.timeout_secs == 0 {
            eyre::bail!("executor.timeout-secs must be > 0");
        }
        if self.executor.command.is_empty() {
            eyre::bail!("executor.command must not be empty");
        }
        Ok(())
    }
}

/// LLM provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSection {
    /// Model identifier sent to the messages API.
    pub model: String,

    /// Response token ceiling per call.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Timeout per LLM call in seconds.
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        let defaults = AnthropicConfig::default();
        Self {
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl LlmSection {
    pub fn to_anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Code generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorSection {
    /// Env var stubbed with a mock credential before generated tests run.
    #[serde(rename = "credential-env")]
    pub credential_env: String,

    /// Directory of prompt template overrides (embedded defaults when unset).
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            credential_env: SafetyConfig::default().credential_env,
            prompts_dir: None,
        }
    }
}

/// Sandbox execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Runner command template with `{test}` and `{report}` placeholders.
    pub command: String,

    /// Wall-clock budget for one test run, in seconds.
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Where sandbox directories are allocated (system temp when unset).
    #[serde(rename = "workspace-root")]
    pub workspace_root: Option<PathBuf>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        let defaults = ExecutorConfig::default();
        Self {
            command: defaults.command,
            timeout_secs: defaults.timeout.as_secs(),
            workspace_root: None,
        }
    }
}

impl ExecutorSection {
    pub fn to_executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::default()
            .with_command(self.command.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(root) = &self.workspace_root {
            config = config.with_workspace_root(root.clone());
        }
        config
    }
}

/// Refinement loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefineSection {
    /// Iteration budget before the loop gives up.
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,
}

impl Default for RefineSection {
    fn default() -> Self {
        Self {
            max_iterations: RefineConfig::default().max_iterations,
        }
    }
}

/// Metaprompt cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetapromptSection {
    /// URL the metaprompt document is fetched from. No fetching when unset.
    pub url: Option<String>,

    /// On-disk cache location. Defaults under the local data dir.
    pub path: Option<PathBuf>,

    /// Cache freshness window in seconds.
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,
}

impl Default for MetapromptSection {
    fn default() -> Self {
        Self {
            url: None,
            path: None,
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl MetapromptSection {
    /// Resolve the cache path, falling back to the local data dir.
    pub fn cache_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("codeloop")
                .join("metaprompt.md")
        })
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditSection {
    /// Whether prompts, responses, and outcomes are persisted.
    pub enabled: bool,

    /// SQLite database location (default under the local data dir).
    pub path: Option<PathBuf>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}
