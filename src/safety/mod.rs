//! Static safety inspection of generated source.
//!
//! Generated code is untrusted. Before anything is written to disk or
//! executed, the scanner walks the syntax tree (not regex matching, which
//! is trivially evaded by whitespace) looking for calls to
//! capability-granting operations: process spawning, shell execution,
//! recursive deletion, dynamic evaluation, dynamic import, and pickle-style
//! deserialization.
//!
//! Policy split, deliberately:
//! - a blacklisted *call* fails the artifact immediately;
//! - an *import* of a sensitive module only warns, since importing `os` to
//!   read an environment variable is legitimate.

pub mod scanner;

pub use scanner::{SafetyConfig, validate};
