//! Iterative refinement: the state machine coordinating generation,
//! validation, execution and feedback across bounded retries.

pub mod coordinator;

pub use coordinator::{Coordinator, RefineConfig, RefineState};
