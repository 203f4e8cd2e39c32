//! Outcome of running a (CodeArtifact, TestArtifact) pair.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single failed test: which test, and what went wrong.
///
/// Order is preserved from the test-runner report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Test identifier (pytest nodeid, or a synthetic id for
    /// timeout/infrastructure entries)
    pub test_id: String,

    /// Error message or traceback
    pub error_detail: String,
}

impl TestFailure {
    pub fn new(test_id: impl Into<String>, error_detail: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            error_detail: error_detail.into(),
        }
    }
}

/// Structured result of one sandboxed test run.
///
/// Invariant: `passed` is true iff `total_count > 0` and
/// `passed_count == total_count`. A zero-test outcome is never "passed",
/// so a suite that collected nothing cannot vacuously succeed. All
/// constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether all tests ran and passed
    pub passed: bool,

    /// Number of passing tests
    pub passed_count: u32,

    /// Total number of tests collected
    pub total_count: u32,

    /// Failed tests in report order
    pub failures: Vec<TestFailure>,

    /// Combined stdout/stderr from the runner, for diagnostics
    pub raw_output: String,
}

impl ExecutionResult {
    /// Build a result from report counts and failures.
    pub fn from_counts(
        passed_count: u32,
        total_count: u32,
        failures: Vec<TestFailure>,
        raw_output: impl Into<String>,
    ) -> Self {
        Self {
            passed: total_count > 0 && passed_count == total_count,
            passed_count,
            total_count,
            failures,
            raw_output: raw_output.into(),
        }
    }

    /// Result for a run that exceeded its wall-clock budget.
    ///
    /// A distinct, recognizable outcome from "tests ran and failed".
    pub fn timeout(budget: Duration) -> Self {
        let msg = format!("Test execution timed out after {} seconds", budget.as_secs());
        Self {
            passed: false,
            passed_count: 0,
            total_count: 0,
            failures: vec![TestFailure::new("timeout", msg.clone())],
            raw_output: msg,
        }
    }

    /// Result for an infrastructure failure: the runner exited but never
    /// wrote a report (crash, misconfiguration). Not a test failure, but
    /// surfaced with diagnostics rather than silently returning an empty
    /// pass.
    pub fn infra(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            passed: false,
            passed_count: 0,
            total_count: 0,
            failures: vec![TestFailure::new("infrastructure", detail.clone())],
            raw_output: detail,
        }
    }

    /// Synthetic result recording why an iteration never reached execution
    /// (safety rejection or unparseable candidate). Keeps the version
    /// history complete even for early termination.
    pub fn rejected(kind: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            passed: false,
            passed_count: 0,
            total_count: 0,
            failures: vec![TestFailure::new(kind, reason.clone())],
            raw_output: reason,
        }
    }

    /// Concatenate every failure's detail into one ordered, model-readable
    /// summary. Used to build the feedback prompt.
    pub fn error_summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.test_id, f.error_detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_passing() {
        let result = ExecutionResult::from_counts(3, 3, Vec::new(), "3 passed");
        assert!(result.passed);
        assert_eq!(result.passed_count, 3);
        assert_eq!(result.total_count, 3);
    }

    #[test]
    fn test_partial_failure() {
        let failures = vec![TestFailure::new("test_b", "assert 1 == 2")];
        let result = ExecutionResult::from_counts(2, 3, failures, "");
        assert!(!result.passed);
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn test_zero_tests_never_passes() {
        let result = ExecutionResult::from_counts(0, 0, Vec::new(), "collected 0 items");
        assert!(!result.passed);
    }

    #[test]
    fn test_timeout_result() {
        let result = ExecutionResult::timeout(Duration::from_secs(60));
        assert!(!result.passed);
        assert_eq!(result.total_count, 0);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].error_detail.contains("timed out after 60 seconds"));
    }

    #[test]
    fn test_infra_result() {
        let result = ExecutionResult::infra("report file missing");
        assert!(!result.passed);
        assert_eq!(result.failures[0].test_id, "infrastructure");
        assert!(result.raw_output.contains("report file missing"));
    }

    #[test]
    fn test_rejected_result() {
        let result = ExecutionResult::rejected("safety", "call to eval");
        assert!(!result.passed);
        assert_eq!(result.failures[0].test_id, "safety");
    }

    #[test]
    fn test_error_summary_preserves_order() {
        let failures = vec![
            TestFailure::new("test_a", "first"),
            TestFailure::new("test_b", "second"),
        ];
        let result = ExecutionResult::from_counts(0, 2, failures, "");
        let summary = result.error_summary();

        let first = summary.find("first").unwrap();
        let second = summary.find("second").unwrap();
        assert!(first < second);
        assert!(summary.contains("test_a"));
    }
}
