//! Codeloop - an automated code synthesis and refinement loop
//!
//! Codeloop drives an LLM through a generate / validate / test / refine
//! cycle: candidate Python code is produced from a task description,
//! screened for unsafe constructs, exercised by generated pytest suites in
//! a throwaway sandbox, and refined from structured failure feedback until
//! the suite passes or the retry budget runs out.

pub mod audit;
pub mod domain;
pub mod error;
pub mod generator;
pub mod llm;
pub mod metaprompt;
pub mod prompt;
pub mod refine;
pub mod safety;
pub mod sandbox;

pub use error::{CodeloopError, Result};
