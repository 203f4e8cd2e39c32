//! CLI module for codeloop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the
//! refinement loop and managing the metaprompt cache.

pub mod commands;

pub use commands::Cli;
