//! Process-isolated test execution in a disposable directory.
//!
//! Per invocation: `Idle -> Running -> {Completed | TimedOut | InfraError}
//! -> CleanedUp`. The implementation and test sources are written as two
//! files inside a fresh temporary directory, so the test file can import
//! the implementation under the fixed module name [`IMPL_MODULE`]. The
//! directory is released on every exit path. No retries happen here;
//! retry policy belongs to the coordinator.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

use super::report::TestReport;
use crate::domain::ExecutionResult;
use crate::error::Result;

/// Fixed module name the implementation is written under, so generated
/// tests can `from generated_code import *` regardless of iteration.
pub const IMPL_MODULE: &str = "generated_code";

/// Configuration for the sandbox executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Runner command template, executed via `sh -c`. `{test}` and
    /// `{report}` are replaced with the test-file and report-file paths.
    pub command: String,

    /// Wall-clock budget for one run.
    pub timeout: Duration,

    /// Where to allocate disposable directories (system temp when `None`).
    pub workspace_root: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: "pytest {test} -v --json-report --json-report-file={report}".to_string(),
            timeout: Duration::from_secs(60),
            workspace_root: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the runner command template.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Set the wall-clock budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allocate disposable directories under the given root.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }
}

/// Runs a (implementation, tests) pair in isolation.
///
/// `run` never errors for ordinary test failures; timeouts and
/// infrastructure problems come back as degraded `ExecutionResult`s so the
/// coordinator can treat them as failed iterations.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, implementation: &str, tests: &str) -> Result<ExecutionResult>;
}

/// Executor that shells out to an external test runner (pytest by default).
pub struct SandboxExecutor {
    config: ExecutorConfig,
}

impl SandboxExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn default_executor() -> Self {
        Self::new(ExecutorConfig::default())
    }

    fn scope(&self) -> std::io::Result<tempfile::TempDir> {
        match &self.config.workspace_root {
            Some(root) => tempfile::tempdir_in(root),
            None => tempfile::tempdir(),
        }
    }
}

#[async_trait]
impl Executor for SandboxExecutor {
    async fn run(&self, implementation: &str, tests: &str) -> Result<ExecutionResult> {
        // Dropped on every exit path, including timeout and parse failure.
        let scope = self.scope()?;

        let code_file = scope.path().join(format!("{}.py", IMPL_MODULE));
        let test_file = scope.path().join(format!("test_{}.py", IMPL_MODULE));
        let report_file = scope.path().join("report.json");

        std::fs::write(&code_file, implementation)?;
        std::fs::write(&test_file, tests)?;

        let command = self
            .config
            .command
            .replace("{test}", &format!("'{}'", test_file.display()))
            .replace("{report}", &format!("'{}'", report_file.display()));
        debug!("running sandboxed tests: {}", command);

        let output = tokio::time::timeout(
            self.config.timeout,
            Command::new("sh")
                .args(["-c", &command])
                .current_dir(scope.path())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let result = match output {
            Err(_) => {
                warn!(
                    "test run exceeded {}s budget, terminating",
                    self.config.timeout.as_secs()
                );
                ExecutionResult::timeout(self.config.timeout)
            }
            Ok(Err(e)) => ExecutionResult::infra(format!("test runner failed to start: {}", e)),
            Ok(Ok(output)) => {
                let raw_output = format!(
                    "{}\n{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );

                if !report_file.exists() {
                    // Crash before report-writing or a misconfigured
                    // runner: an infrastructure error, not a test failure.
                    ExecutionResult::infra(format!(
                        "test runner produced no report file. Output:\n{}",
                        raw_output.trim()
                    ))
                } else {
                    let raw_report = std::fs::read_to_string(&report_file)?;
                    match TestReport::parse(&raw_report) {
                        Ok(report) => report.into_execution_result(raw_output),
                        Err(e) => {
                            ExecutionResult::infra(format!("test report unreadable: {}", e))
                        }
                    }
                }
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PASS_REPORT: &str = r#"{\"summary\": {\"total\": 1, \"passed\": 1}, \"tests\": [{\"nodeid\": \"t::test_a\", \"outcome\": \"passed\"}]}"#;
    const FAIL_REPORT: &str = r#"{\"summary\": {\"total\": 2, \"passed\": 1}, \"tests\": [{\"nodeid\": \"t::test_b\", \"outcome\": \"failed\", \"longrepr\": \"assert 1 == 2\"}]}"#;

    fn executor_with_command(command: &str) -> SandboxExecutor {
        SandboxExecutor::new(ExecutorConfig::default().with_command(command))
    }

    #[tokio::test]
    async fn test_passing_run() {
        let exec = executor_with_command(&format!("echo \"{}\" > {{report}}", PASS_REPORT));
        let result = exec.run("def f(): return 2", "def test_f(): pass").await.unwrap();

        assert!(result.passed);
        assert_eq!(result.total_count, 1);
    }

    #[tokio::test]
    async fn test_failing_run() {
        let exec = executor_with_command(&format!("echo \"{}\" > {{report}}", FAIL_REPORT));
        let result = exec.run("def f(): return 1", "def test_f(): assert False").await.unwrap();

        assert!(!result.passed);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].test_id, "t::test_b");
        assert!(result.failures[0].error_detail.contains("assert 1 == 2"));
    }

    #[tokio::test]
    async fn test_timeout_produces_degraded_result() {
        let exec = SandboxExecutor::new(
            ExecutorConfig::default()
                .with_command("sleep 30")
                .with_timeout(Duration::from_millis(100)),
        );
        let result = exec.run("x = 1", "pass").await.unwrap();

        assert!(!result.passed);
        assert_eq!(result.total_count, 0);
        assert!(result.failures[0].error_detail.contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_cleans_up_disposable_scope() {
        let root = TempDir::new().unwrap();
        let exec = SandboxExecutor::new(
            ExecutorConfig::default()
                .with_command("sleep 30")
                .with_timeout(Duration::from_millis(100))
                .with_workspace_root(root.path()),
        );

        exec.run("x = 1", "pass").await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "temp scope not cleaned up: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_missing_report_is_infra_error() {
        // Runner exits cleanly but never writes the report.
        let exec = executor_with_command("true");
        let result = exec.run("x = 1", "pass").await.unwrap();

        assert!(!result.passed);
        assert_eq!(result.failures[0].test_id, "infrastructure");
        assert!(result.failures[0].error_detail.contains("no report file"));
    }

    #[tokio::test]
    async fn test_corrupt_report_is_infra_error() {
        let exec = executor_with_command("echo 'not json' > {report}");
        let result = exec.run("x = 1", "pass").await.unwrap();

        assert!(!result.passed);
        assert!(result.failures[0].error_detail.contains("unreadable"));
    }

    #[tokio::test]
    async fn test_sources_written_under_fixed_module_name() {
        // The runner sees generated_code.py next to the test file.
        let exec = executor_with_command(&format!(
            "test -f {}.py && echo \"{}\" > {{report}}",
            IMPL_MODULE, PASS_REPORT
        ));
        let result = exec.run("def f(): return 2", "from generated_code import f").await.unwrap();
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_normal_run_cleans_up_disposable_scope() {
        let root = TempDir::new().unwrap();
        let exec = SandboxExecutor::new(
            ExecutorConfig::default()
                .with_command("true")
                .with_workspace_root(root.path()),
        );

        exec.run("x = 1", "pass").await.unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert!(config.command.contains("pytest"));
        assert!(config.command.contains("{report}"));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.workspace_root.is_none());
    }
}
