//! Machine-readable test-runner report parsing.
//!
//! The executor asks pytest for a structured JSON report
//! (`--json-report-file`) instead of scraping console text. Only the
//! fields the loop needs are deserialized; everything else in the report
//! is ignored.

use serde::Deserialize;

use crate::domain::{ExecutionResult, TestFailure};
use crate::error::Result;

/// Top-level JSON report written by the test runner.
#[derive(Debug, Clone, Deserialize)]
pub struct TestReport {
    #[serde(default)]
    pub summary: Summary,

    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

/// Aggregate counts from the report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total: u32,

    #[serde(default)]
    pub passed: u32,
}

/// Per-test outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEntry {
    #[serde(default = "unknown_test")]
    pub nodeid: String,

    #[serde(default)]
    pub outcome: String,

    /// Full failure representation (traceback), when the test failed.
    #[serde(default)]
    pub longrepr: Option<String>,
}

fn unknown_test() -> String {
    "Unknown test".to_string()
}

impl TestReport {
    /// Parse the raw report file contents.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Convert the report into an `ExecutionResult`, preserving the
    /// report's failure order.
    pub fn into_execution_result(self, raw_output: String) -> ExecutionResult {
        let failures = self
            .tests
            .iter()
            .filter(|t| t.outcome == "failed")
            .map(|t| {
                TestFailure::new(
                    t.nodeid.clone(),
                    t.longrepr.clone().unwrap_or_else(|| "No error message".to_string()),
                )
            })
            .collect();

        ExecutionResult::from_counts(self.summary.passed, self.summary.total, failures, raw_output)
    }
}
