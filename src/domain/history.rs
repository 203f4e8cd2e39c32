//! Iteration history and the terminal outcome of a refinement run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution::ExecutionResult;

/// Immutable snapshot of one iteration's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-indexed iteration number
    pub iteration: u32,

    /// The execution result (possibly synthetic, for iterations that were
    /// rejected before execution)
    pub result: ExecutionResult,

    /// When the iteration finished
    pub timestamp: DateTime<Utc>,
}

impl IterationRecord {
    pub fn new(iteration: u32, result: ExecutionResult) -> Self {
        Self {
            iteration,
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only record of every iteration in a run.
///
/// Insertion order is iteration order; records are never reordered or
/// pruned, so the full audit trail exists even for early termination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionHistory {
    records: Vec<IterationRecord>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: IterationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }
}

/// Terminal result of a refinement run.
///
/// Owned exclusively by the caller once returned; the coordinator holds no
/// state afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefinementOutcome {
    Success {
        /// The final, passing candidate source
        final_code: String,
        /// The test suite the candidate passed
        final_tests: String,
        /// How many iterations were consumed
        iterations_used: u32,
        /// Full audit trail
        history: VersionHistory,
    },
    Failure {
        /// Human-readable reason ("retries exhausted", safety detail, ...)
        reason: String,
        /// Full audit trail up to the point of failure
        history: VersionHistory,
    },
}

impl RefinementOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefinementOutcome::Success { .. })
    }

    pub fn history(&self) -> &VersionHistory {
        match self {
            RefinementOutcome::Success { history, .. } => history,
            RefinementOutcome::Failure { history, .. } => history,
        }
    }
}
