//! Candidate artifacts and their provenance.

use serde::{Deserialize, Serialize};

/// Immutable natural-language description of the desired program behavior.
///
/// Supplied once per refinement run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task(String);

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn description(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which prompt and model produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Model identifier that produced the artifact
    pub model: String,

    /// The prompt that was sent (kept for audit/debugging)
    pub prompt: String,
}

impl Provenance {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

/// A versioned candidate implementation.
///
/// Created by the generator each iteration; superseded (not deleted) by the
/// next iteration's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    /// 1-indexed version, matching the iteration that produced it
    pub version: u32,

    /// The candidate source text
    pub source: String,

    /// Generation provenance
    pub provenance: Provenance,
}

impl CodeArtifact {
    pub fn new(version: u32, source: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            version,
            source: source.into(),
            provenance,
        }
    }

    /// Whether this candidate is textually identical to another after
    /// trimming. Used by the coordinator's stagnation guard.
    pub fn same_source_as(&self, other: &str) -> bool {
        self.source.trim() == other.trim()
    }
}

/// Source text of a generated test suite targeting exactly one
/// `CodeArtifact` version. Regenerated fresh each iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestArtifact {
    /// The code version these tests target
    pub targets_version: u32,

    /// The test source text (preamble included)
    pub source: String,
}

impl TestArtifact {
    pub fn new(targets_version: u32, source: impl Into<String>) -> Self {
        Self {
            targets_version,
            source: source.into(),
        }
    }
}
