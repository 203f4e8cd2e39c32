//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: generate and refine code for a task until its tests pass
//! - metaprompt: show/refresh/clear the cached metaprompt document
//! - audit: inspect the audit trail

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Codeloop - an automated code synthesis and refinement loop
#[derive(Parser, Debug)]
#[command(name = "codeloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate code for a task and refine it until its tests pass
    Run {
        /// Natural-language task description
        task: String,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,

        /// Override the iteration budget
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Override the per-run test timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Skip the metaprompt entirely
        #[arg(long)]
        no_metaprompt: bool,

        /// Print the final test suite alongside the code
        #[arg(long)]
        show_tests: bool,
    },

    /// Metaprompt cache management
    Metaprompt {
        #[command(subcommand)]
        command: MetapromptCommands,
    },

    /// Show audit trail counters
    Audit,
}

/// Metaprompt cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum MetapromptCommands {
    /// Print the current metaprompt (fetching if stale)
    Show,

    /// Force a re-fetch regardless of cache age
    Refresh,

    /// Delete the cached copy
    Clear,
}
