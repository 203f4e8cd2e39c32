//! Sandboxed execution of generated tests against generated code.
//!
//! Untrusted code is never evaluated in-process. Every run launches a
//! separate test-runner process inside a fresh throwaway directory, bounded
//! by a wall-clock timeout. This process boundary is the load-bearing
//! safety mechanism and must not be weakened to in-process evaluation.

pub mod executor;
pub mod mock;
pub mod report;

pub use executor::{Executor, ExecutorConfig, IMPL_MODULE, SandboxExecutor};
pub use mock::ScriptedExecutor;
pub use report::TestReport;
