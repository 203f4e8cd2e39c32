//! Scripted mock executor for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::executor::Executor;
use crate::domain::ExecutionResult;
use crate::error::{CodeloopError, Result};

/// Executor that replays a scripted sequence of results and records the
/// (implementation, tests) pairs it was asked to run.
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<ExecutionResult>>,
    runs: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// The (implementation, tests) pairs run so far, in call order.
    pub fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(&self, implementation: &str, tests: &str) -> Result<ExecutionResult> {
        self.runs
            .lock()
            .unwrap()
            .push((implementation.to_string(), tests.to_string()));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CodeloopError::Storage("scripted results exhausted".to_string()))
    }
}
