//! Refinement coordinator - drives the generate/validate/execute/feedback
//! loop until tests pass or the retry budget runs out.
//!
//! Per iteration:
//! `GeneratingCode -> ValidatingCode -> GeneratingTests -> ValidatingTests
//! -> Executing -> {Succeeded | BuildingFeedback | ExhaustedRetries |
//! SafetyRejected}`.
//!
//! Iterations are strictly sequential: feedback depends on the previous
//! execution. Each iteration's result is appended to the version history
//! before any branch decision, so the audit trail is complete even on
//! early termination. The coordinator owns nothing once it returns.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::audit::{AuditStore, WorkflowRecord};
use crate::domain::{
    CodeArtifact, ExecutionResult, IterationRecord, Provenance, RefinementOutcome, Task,
    TestArtifact, VersionHistory,
};
use crate::error::{CodeloopError, Result};
use crate::generator::CodeGenerator;
use crate::llm::LlmClient;
use crate::safety::{self, SafetyConfig};
use crate::sandbox::Executor;

/// Configuration for a refinement run.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    /// Maximum number of iterations before giving up.
    pub max_iterations: u32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

/// States of the per-iteration machine, logged as transitions happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineState {
    GeneratingCode,
    ValidatingCode,
    GeneratingTests,
    ValidatingTests,
    Executing,
    BuildingFeedback,
    Succeeded,
    ExhaustedRetries,
    SafetyRejected,
}

/// What validating-and-executing one candidate produced.
enum Evaluation {
    /// Safety violation: fatal to the whole run, never retried.
    SafetyRejected(String),
    /// An execution result, possibly synthetic (parse failures never reach
    /// the sandbox but still count as a failed iteration).
    Completed {
        result: ExecutionResult,
        tests: Option<TestArtifact>,
    },
}

/// Coordinates one refinement run. Stateless between runs; every run gets
/// its own history and returns it to the caller.
pub struct Coordinator<L: LlmClient, E: Executor> {
    generator: CodeGenerator<L>,
    executor: Arc<E>,
    safety: SafetyConfig,
    config: RefineConfig,
    audit: Option<Arc<AuditStore>>,
}

impl<L: LlmClient, E: Executor> Coordinator<L, E> {
    pub fn new(
        generator: CodeGenerator<L>,
        executor: Arc<E>,
        safety: SafetyConfig,
        config: RefineConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            safety,
            config,
            audit: None,
        }
    }

    /// Attach an audit store; terminal outcomes are recorded there.
    pub fn with_audit(mut self, audit: Arc<AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run the loop for a task until tests pass or retries are exhausted.
    ///
    /// `metaprompt` is opaque documentation text embedded in the initial
    /// prompt (empty string for none).
    pub async fn run(&self, task: &Task, metaprompt: &str) -> Result<RefinementOutcome> {
        let mut history = VersionHistory::new();
        let mut state = RefineState::GeneratingCode;

        let initial_prompt = self
            .generator
            .initial_prompt(task.description(), metaprompt)?;
        let source = self.generator.generate(&initial_prompt).await?;
        let mut current = CodeArtifact::new(
            1,
            source,
            Provenance::new(self.generator.model(), initial_prompt),
        );
        let mut last_tests: Option<TestArtifact> = None;

        for iteration in 1..=self.config.max_iterations {
            info!(
                "iteration {}/{} (candidate v{})",
                iteration, self.config.max_iterations, current.version
            );

            let evaluation = self.evaluate(task, &current, &mut state).await?;

            let result = match evaluation {
                Evaluation::SafetyRejected(detail) => {
                    transition(&mut state, RefineState::SafetyRejected);
                    history.push(IterationRecord::new(
                        iteration,
                        ExecutionResult::rejected("safety", detail.clone()),
                    ));
                    let reason = format!("safety violation: {}", detail);
                    self.record_workflow(task, None, None, false);
                    return Ok(RefinementOutcome::Failure { reason, history });
                }
                Evaluation::Completed { result, tests } => {
                    if tests.is_some() {
                        last_tests = tests;
                    }
                    // Appended before any branch decision
                    history.push(IterationRecord::new(iteration, result.clone()));
                    result
                }
            };

            if result.passed {
                transition(&mut state, RefineState::Succeeded);
                self.record_workflow(
                    task,
                    Some(&current.source),
                    last_tests.as_ref().map(|t| t.source.as_str()),
                    true,
                );
                return Ok(RefinementOutcome::Success {
                    final_code: current.source,
                    final_tests: last_tests.map(|t| t.source).unwrap_or_default(),
                    iterations_used: iteration,
                    history,
                });
            }

            if iteration == self.config.max_iterations {
                break;
            }

            transition(&mut state, RefineState::BuildingFeedback);
            let summary = result.error_summary();
            let feedback_prompt =
                self.generator
                    .feedback_prompt(task.description(), &current.source, &summary)?;

            transition(&mut state, RefineState::GeneratingCode);
            let next_source = self.generator.generate(&feedback_prompt).await?;

            if current.same_source_as(&next_source) {
                // A model that cannot find a fix keeps reproducing the same
                // broken code; stop instead of burning the budget.
                warn!("stagnation detected at iteration {}", iteration);
                self.record_workflow(task, None, None, false);
                return Ok(RefinementOutcome::Failure {
                    reason: format!("no change produced in iteration {}", iteration),
                    history,
                });
            }

            current = CodeArtifact::new(
                iteration + 1,
                next_source,
                Provenance::new(self.generator.model(), feedback_prompt),
            );
        }

        transition(&mut state, RefineState::ExhaustedRetries);
        self.record_workflow(task, None, None, false);
        Ok(RefinementOutcome::Failure {
            reason: "retries exhausted".to_string(),
            history,
        })
    }

    /// Validate the candidate, generate and validate its tests, execute.
    ///
    /// Parse errors (from either artifact) become synthetic failed results
    /// that drive the feedback loop; safety violations abort the run.
    async fn evaluate(
        &self,
        task: &Task,
        candidate: &CodeArtifact,
        state: &mut RefineState,
    ) -> Result<Evaluation> {
        transition(state, RefineState::ValidatingCode);
        match safety::validate(&candidate.source, &self.safety) {
            Ok(()) => {}
            Err(CodeloopError::Safety(detail)) => {
                return Ok(Evaluation::SafetyRejected(detail));
            }
            Err(CodeloopError::Parse(detail)) => {
                return Ok(Evaluation::Completed {
                    result: ExecutionResult::rejected(
                        "parse",
                        format!("implementation does not parse: {}", detail),
                    ),
                    tests: None,
                });
            }
            Err(e) => return Err(e),
        }

        transition(state, RefineState::GeneratingTests);
        let test_source = self
            .generator
            .generate_tests(task.description(), &candidate.source)
            .await?;
        let tests = TestArtifact::new(candidate.version, test_source);

        transition(state, RefineState::ValidatingTests);
        match safety::validate(&tests.source, &self.safety) {
            Ok(()) => {}
            Err(CodeloopError::Safety(detail)) => {
                return Ok(Evaluation::SafetyRejected(format!("in tests: {}", detail)));
            }
            Err(CodeloopError::Parse(detail)) => {
                return Ok(Evaluation::Completed {
                    result: ExecutionResult::rejected(
                        "parse",
                        format!("generated tests do not parse: {}", detail),
                    ),
                    tests: Some(tests),
                });
            }
            Err(e) => return Err(e),
        }

        transition(state, RefineState::Executing);
        let result = self.executor.run(&candidate.source, &tests.source).await?;

        Ok(Evaluation::Completed {
            result,
            tests: Some(tests),
        })
    }

    fn record_workflow(
        &self,
        task: &Task,
        final_code: Option<&str>,
        final_tests: Option<&str>,
        success: bool,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let record = WorkflowRecord {
            task: task.description().to_string(),
            model: self.generator.model().to_string(),
            max_retries: self.config.max_iterations,
            final_code: final_code.map(str::to_string),
            final_test_code: final_tests.map(str::to_string),
            success,
        };
        if let Err(e) = audit.record_workflow(&record) {
            warn!("failed to audit workflow outcome: {}", e);
        }
    }
}

fn transition(state: &mut RefineState, next: RefineState) {
    debug!("state {:?} -> {:?}", state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestFailure;
    use crate::generator::GeneratorConfig;
    use crate::llm::MockLlmClient;
    use crate::prompt::PromptLoader;
    use crate::sandbox::ScriptedExecutor;

    const CODE_V1: &str = "```python\ndef answer():\n    return 1\n```";
    const CODE_V2: &str = "```python\ndef answer():\n    return 2\n```";
    const TESTS: &str = "```python\ndef test_answer():\n    assert answer() == 2\n```";

    fn coordinator(
        responses: &[&str],
        results: Vec<ExecutionResult>,
        max_iterations: u32,
    ) -> (Coordinator<MockLlmClient, ScriptedExecutor>, Arc<ScriptedExecutor>) {
        let (coordinator, executor, _) = coordinator_with_llm(responses, results, max_iterations);
        (coordinator, executor)
    }

    fn coordinator_with_llm(
        responses: &[&str],
        results: Vec<ExecutionResult>,
        max_iterations: u32,
    ) -> (
        Coordinator<MockLlmClient, ScriptedExecutor>,
        Arc<ScriptedExecutor>,
        Arc<MockLlmClient>,
    ) {
        let llm = Arc::new(MockLlmClient::from_slices(responses));
        let generator = CodeGenerator::new(
            llm.clone(),
            Arc::new(PromptLoader::embedded()),
            GeneratorConfig::default(),
        );
        let executor = Arc::new(ScriptedExecutor::new(results));
        let coordinator = Coordinator::new(
            generator,
            executor.clone(),
            SafetyConfig::default(),
            RefineConfig { max_iterations },
        );
        (coordinator, executor, llm)
    }

    fn failing_result() -> ExecutionResult {
        ExecutionResult::from_counts(
            0,
            1,
            vec![TestFailure::new(
                "test_generated_code.py::test_answer",
                "assert 1 == 2",
            )],
            "1 failed",
        )
    }

    fn passing_result() -> ExecutionResult {
        ExecutionResult::from_counts(1, 1, Vec::new(), "1 passed")
    }

    #[tokio::test]
    async fn test_success_on_first_iteration() {
        let (coordinator, executor) =
            coordinator(&[CODE_V2, TESTS], vec![passing_result()], 5);

        let outcome = coordinator
            .run(&Task::new("return 2 from a function"), "")
            .await
            .unwrap();

        match outcome {
            RefinementOutcome::Success {
                final_code,
                final_tests,
                iterations_used,
                history,
            } => {
                assert!(final_code.contains("return 2"));
                assert!(final_tests.contains("generated_code"));
                assert_eq!(iterations_used, 1);
                assert_eq!(history.len(), 1);
                assert!(history.records()[0].result.passed);
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_feedback_loop_succeeds_on_second_iteration() {
        // Iteration 1: wrong code, 0/1. Iteration 2: fixed code, 1/1.
        let (coordinator, executor) = coordinator(
            &[CODE_V1, TESTS, CODE_V2, TESTS],
            vec![failing_result(), passing_result()],
            5,
        );

        let outcome = coordinator
            .run(&Task::new("return 2 from a function"), "")
            .await
            .unwrap();

        match outcome {
            RefinementOutcome::Success {
                final_code,
                iterations_used,
                history,
                ..
            } => {
                assert!(final_code.contains("return 2"));
                assert_eq!(iterations_used, 2);
                assert_eq!(history.len(), 2);
                assert!(!history.records()[0].result.passed);
                assert!(history.records()[1].result.passed);
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_feedback_prompt_contains_failure_details() {
        let (coordinator, _, llm) = coordinator_with_llm(
            &[CODE_V1, TESTS, CODE_V2, TESTS],
            vec![failing_result(), passing_result()],
            5,
        );

        let task = Task::new("return 2 from a function");
        coordinator.run(&task, "").await.unwrap();

        // Call order: initial prompt, testgen, feedback, testgen.
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 4);
        let feedback = &prompts[2];
        assert!(feedback.contains("assert 1 == 2"));
        assert!(feedback.contains("return 1"));
        assert!(feedback.contains("return 2 from a function"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_after_exactly_n_iterations() {
        // Distinct failing candidates each round so stagnation never fires.
        let code_v3 = "```python\ndef answer():\n    return 3\n```";
        let (coordinator, executor) = coordinator(
            &[CODE_V1, TESTS, CODE_V2, TESTS, code_v3, TESTS],
            vec![failing_result(), failing_result(), failing_result()],
            3,
        );

        let outcome = coordinator.run(&Task::new("return 2"), "").await.unwrap();

        match outcome {
            RefinementOutcome::Failure { reason, history } => {
                assert_eq!(reason, "retries exhausted");
                assert_eq!(history.len(), 3);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn test_stagnation_stops_early() {
        // The model "fixes" the code by reproducing it verbatim.
        let (coordinator, executor) = coordinator(
            &[CODE_V1, TESTS, CODE_V1],
            vec![failing_result()],
            5,
        );

        let outcome = coordinator.run(&Task::new("return 2"), "").await.unwrap();

        match outcome {
            RefinementOutcome::Failure { reason, history } => {
                assert!(reason.contains("no change"));
                // Only one iteration ran; the budget of 5 was not consumed
                assert_eq!(history.len(), 1);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsafe_code_aborts_without_execution() {
        let unsafe_code = "```python\nimport subprocess\nsubprocess.run(['rm', '-rf', '/'])\n```";
        let (coordinator, executor) = coordinator(&[unsafe_code], vec![], 5);

        let outcome = coordinator.run(&Task::new("clean up"), "").await.unwrap();

        match outcome {
            RefinementOutcome::Failure { reason, history } => {
                assert!(reason.contains("safety violation"));
                assert!(reason.contains("subprocess.run"));
                // The rejection is still on the audit trail
                assert_eq!(history.len(), 1);
                assert_eq!(history.records()[0].result.failures[0].test_id, "safety");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        // Never reached the sandbox
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsafe_tests_abort_without_execution() {
        let unsafe_tests = "```python\ndef test_x():\n    eval('1+1')\n```";
        let (coordinator, executor) = coordinator(&[CODE_V2, unsafe_tests], vec![], 5);

        let outcome = coordinator.run(&Task::new("return 2"), "").await.unwrap();

        match outcome {
            RefinementOutcome::Failure { reason, .. } => {
                assert!(reason.contains("safety violation"));
                assert!(reason.contains("in tests"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_code_feeds_the_loop() {
        // Garbage candidate never reaches the sandbox but counts as a
        // failed iteration and drives feedback.
        let garbage = "```python\ndef broken(:\n    return\n```";
        let (coordinator, executor) = coordinator(
            &[garbage, CODE_V2, TESTS],
            vec![passing_result()],
            5,
        );

        let outcome = coordinator.run(&Task::new("return 2"), "").await.unwrap();

        match outcome {
            RefinementOutcome::Success {
                iterations_used,
                history,
                ..
            } => {
                assert_eq!(iterations_used, 2);
                assert_eq!(history.len(), 2);
                assert_eq!(history.records()[0].result.failures[0].test_id, "parse");
            }
            other => panic!("expected success, got {:?}", other),
        }
        // Iteration 1 skipped execution entirely
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_test_run_is_a_failed_iteration() {
        let empty_run = ExecutionResult::from_counts(0, 0, Vec::new(), "collected 0 items");
        let (coordinator, _) = coordinator(
            &[CODE_V1, TESTS, CODE_V1],
            vec![empty_run],
            5,
        );

        // Candidate 2 equals candidate 1, so the run ends in stagnation;
        // what matters is that 0/0 was not treated as success.
        let outcome = coordinator.run(&Task::new("return 2"), "").await.unwrap();
        assert!(!outcome.is_success());
        assert!(!outcome.history().records()[0].result.passed);
    }

    #[tokio::test]
    async fn test_timeout_result_is_retried_with_feedback() {
        let (coordinator, executor) = coordinator(
            &[CODE_V1, TESTS, CODE_V2, TESTS],
            vec![
                ExecutionResult::timeout(std::time::Duration::from_secs(60)),
                passing_result(),
            ],
            5,
        );

        let outcome = coordinator.run(&Task::new("return 2"), "").await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_generation_error_propagates() {
        // Mock exhausts after the first candidate: test generation fails.
        let (coordinator, _) = coordinator(&[CODE_V2], vec![], 5);

        let err = coordinator.run(&Task::new("return 2"), "").await.unwrap_err();
        assert!(matches!(err, CodeloopError::Generation(_)));
    }

    #[tokio::test]
    async fn test_outcomes_are_audited() {
        let audit = Arc::new(AuditStore::open_in_memory().unwrap());

        let generator = CodeGenerator::new(
            Arc::new(MockLlmClient::from_slices(&[CODE_V2, TESTS])),
            Arc::new(PromptLoader::embedded()),
            GeneratorConfig::default(),
        )
        .with_audit(audit.clone());
        let executor = Arc::new(ScriptedExecutor::new(vec![passing_result()]));
        let coordinator = Coordinator::new(
            generator,
            executor,
            SafetyConfig::default(),
            RefineConfig::default(),
        )
        .with_audit(audit.clone());

        coordinator.run(&Task::new("return 2"), "").await.unwrap();

        // Two round-trips (code + tests) and one workflow row
        assert_eq!(audit.response_count().unwrap(), 2);
        assert_eq!(audit.workflow_count().unwrap(), 1);
    }
}
