//! Prompt Loader - Load and cache prompt templates
//!
//! Templates are resolved by name: an override directory (if configured)
//! wins, otherwise the embedded defaults shipped with the crate are used.
//! Loaded templates are cached in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{CodeloopError, Result};

/// Initial code-generation template name.
pub const GENERATE: &str = "generate";
/// Test-generation template name.
pub const TESTGEN: &str = "testgen";
/// Feedback (refinement) template name.
pub const FEEDBACK: &str = "feedback";

const DEFAULT_GENERATE: &str = include_str!("../../prompts/generate.hbs");
const DEFAULT_TESTGEN: &str = include_str!("../../prompts/testgen.hbs");
const DEFAULT_FEEDBACK: &str = include_str!("../../prompts/feedback.hbs");

/// Loads and caches prompt templates, falling back to embedded defaults
pub struct PromptLoader {
    /// Optional directory of override templates (`<name>.hbs`)
    templates_dir: Option<PathBuf>,
    /// In-memory cache of loaded templates
    cache: RwLock<HashMap<String, String>>,
}

impl PromptLoader {
    /// Create a loader that only serves the embedded defaults
    pub fn embedded() -> Self {
        Self {
            templates_dir: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create a loader with an override directory
    pub fn with_dir(templates_dir: impl AsRef<Path>) -> Self {
        Self {
            templates_dir: Some(templates_dir.as_ref().to_path_buf()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a template by name
    pub fn load(&self, name: &str) -> Result<String> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|e| CodeloopError::Template(format!("Failed to acquire read lock: {}", e)))?;
            if let Some(content) = cache.get(name) {
                return Ok(content.clone());
            }
        }

        let content = self.resolve(name)?;

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|e| CodeloopError::Template(format!("Failed to acquire write lock: {}", e)))?;
            cache.insert(name.to_string(), content.clone());
        }

        Ok(content)
    }

    /// Resolve a template from the override directory or the defaults
    fn resolve(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.templates_dir {
            let path = dir.join(format!("{}.hbs", name));
            if path.is_file() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    CodeloopError::Template(format!(
                        "Failed to load template '{}' from {:?}: {}",
                        name, path, e
                    ))
                });
            }
        }

        match name {
            GENERATE => Ok(DEFAULT_GENERATE.to_string()),
            TESTGEN => Ok(DEFAULT_TESTGEN.to_string()),
            FEEDBACK => Ok(DEFAULT_FEEDBACK.to_string()),
            other => Err(CodeloopError::Template(format!(
                "Unknown template: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_defaults_available() {
        let loader = PromptLoader::embedded();
        for name in [GENERATE, TESTGEN, FEEDBACK] {
            let template = loader.load(name).unwrap();
            assert!(!template.is_empty(), "template {} is empty", name);
        }
    }

    #[test]
    fn test_default_templates_have_expected_slots() {
        let loader = PromptLoader::embedded();
        assert!(loader.load(GENERATE).unwrap().contains("{{task}}"));
        assert!(loader.load(TESTGEN).unwrap().contains("{{code}}"));
        let feedback = loader.load(FEEDBACK).unwrap();
        assert!(feedback.contains("{{error_feedback}}"));
        assert!(feedback.contains("{{code}}"));
    }

    #[test]
    fn test_unknown_template_is_error() {
        let loader = PromptLoader::embedded();
        assert!(matches!(
            loader.load("nonexistent"),
            Err(CodeloopError::Template(_))
        ));
    }

    #[test]
    fn test_override_directory_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("generate.hbs"), "custom: {{task}}").unwrap();

        let loader = PromptLoader::with_dir(dir.path());
        assert_eq!(loader.load(GENERATE).unwrap(), "custom: {{task}}");
        // Names without an override still fall back to defaults
        assert!(loader.load(TESTGEN).unwrap().contains("{{code}}"));
    }

    #[test]
    fn test_cache_serves_repeat_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generate.hbs");
        std::fs::write(&path, "v1").unwrap();

        let loader = PromptLoader::with_dir(dir.path());
        assert_eq!(loader.load(GENERATE).unwrap(), "v1");

        // Mutating the file after first load does not change the cached copy
        std::fs::write(&path, "v2").unwrap();
        assert_eq!(loader.load(GENERATE).unwrap(), "v1");
    }
}
