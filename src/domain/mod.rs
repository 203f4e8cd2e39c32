//! Domain types for the refinement loop.
//!
//! These types are the data model shared by the generator, executor and
//! coordinator: candidate artifacts, execution results, and the append-only
//! version history returned to the caller.

pub mod artifact;
pub mod execution;
pub mod history;

pub use artifact::{CodeArtifact, Provenance, Task, TestArtifact};
pub use execution::{ExecutionResult, TestFailure};
pub use history::{IterationRecord, RefinementOutcome, VersionHistory};
