use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, MetapromptCommands};
use config::Config;

use codeloop::audit::AuditStore;
use codeloop::domain::{RefinementOutcome, Task};
use codeloop::generator::{CodeGenerator, GeneratorConfig};
use codeloop::llm::AnthropicClient;
use codeloop::metaprompt::MetapromptCache;
use codeloop::prompt::PromptLoader;
use codeloop::refine::{Coordinator, RefineConfig};
use codeloop::safety::SafetyConfig;
use codeloop::sandbox::SandboxExecutor;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codeloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("codeloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_audit(config: &Config) -> Result<Option<Arc<AuditStore>>> {
    if !config.audit.enabled {
        return Ok(None);
    }
    let store = match &config.audit.path {
        Some(path) => AuditStore::open(path),
        None => AuditStore::open_default(),
    }
    .context("Failed to open audit store")?;
    Ok(Some(Arc::new(store)))
}

fn metaprompt_cache(config: &Config) -> MetapromptCache {
    MetapromptCache::new(
        config.metaprompt.cache_path(),
        config.metaprompt.url.clone(),
        Duration::from_secs(config.metaprompt.ttl_secs),
    )
}

async fn handle_run(
    task: &str,
    model: Option<String>,
    max_iterations: Option<u32>,
    timeout: Option<u64>,
    no_metaprompt: bool,
    show_tests: bool,
    config: &Config,
) -> Result<()> {
    info!("Starting refinement run for task: {}", task);

    let mut llm_config = config.llm.to_anthropic_config();
    if let Some(model) = model {
        llm_config.model = model;
    }
    let llm = Arc::new(AnthropicClient::new(llm_config).context("Failed to create LLM client")?);

    let loader = Arc::new(match &config.generator.prompts_dir {
        Some(dir) => PromptLoader::with_dir(dir),
        None => PromptLoader::embedded(),
    });

    let generator_config = GeneratorConfig {
        credential_env: config.generator.credential_env.clone(),
        ..Default::default()
    };

    let mut executor_config = config.executor.to_executor_config();
    if let Some(secs) = timeout {
        executor_config = executor_config.with_timeout(Duration::from_secs(secs));
    }
    let executor = Arc::new(SandboxExecutor::new(executor_config));

    let safety_config = SafetyConfig {
        credential_env: config.generator.credential_env.clone(),
    };

    let refine_config = RefineConfig {
        max_iterations: max_iterations.unwrap_or(config.refine.max_iterations),
    };

    let audit = open_audit(config)?;

    let mut generator = CodeGenerator::new(llm, loader, generator_config);
    if let Some(store) = &audit {
        generator = generator.with_audit(store.clone());
    }

    let mut coordinator = Coordinator::new(generator, executor, safety_config, refine_config);
    if let Some(store) = &audit {
        coordinator = coordinator.with_audit(store.clone());
    }

    let metaprompt = if no_metaprompt {
        String::new()
    } else {
        metaprompt_cache(config)
            .load()
            .await
            .context("Failed to load metaprompt")?
    };

    let outcome = coordinator
        .run(&Task::new(task), &metaprompt)
        .await
        .context("Refinement run failed")?;

    match outcome {
        RefinementOutcome::Success {
            final_code,
            final_tests,
            iterations_used,
            ..
        } => {
            println!(
                "{} after {} iteration(s)",
                "Tests passed".green(),
                iterations_used
            );
            println!("\n{}", final_code);
            if show_tests {
                println!("\n{}", "# Test suite".cyan());
                println!("{}", final_tests);
            }
            Ok(())
        }
        RefinementOutcome::Failure { reason, history } => {
            eprintln!("{} {}", "Refinement failed:".red(), reason);
            if let Some(record) = history.last() {
                eprintln!(
                    "Last run: {}/{} tests passed",
                    record.result.passed_count, record.result.total_count
                );
            }
            eyre::bail!("refinement failed: {}", reason);
        }
    }
}

async fn handle_metaprompt_command(command: &MetapromptCommands, config: &Config) -> Result<()> {
    let cache = metaprompt_cache(config);
    match command {
        MetapromptCommands::Show => {
            let content = cache.load().await.context("Failed to load metaprompt")?;
            if content.is_empty() {
                println!("{}", "No metaprompt cached or configured".yellow());
            } else {
                println!("{}", content);
            }
        }
        MetapromptCommands::Refresh => {
            let content = cache.refresh().await.context("Failed to refresh metaprompt")?;
            println!(
                "{} {} bytes cached at {}",
                "Refreshed:".green(),
                content.len(),
                cache.path().display()
            );
        }
        MetapromptCommands::Clear => {
            cache.clear().context("Failed to clear metaprompt cache")?;
            println!("{} {}", "Cleared:".green(), cache.path().display());
        }
    }
    Ok(())
}

fn handle_audit_command(config: &Config) -> Result<()> {
    let Some(store) = open_audit(config)? else {
        println!("{}", "Audit trail is disabled in config".yellow());
        return Ok(());
    };
    let responses = store.response_count().context("Failed to read audit store")?;
    let workflows = store.workflow_count().context("Failed to read audit store")?;
    println!("{}", "Audit trail".cyan());
    println!("  LLM responses recorded: {}", responses);
    println!("  Workflows recorded:     {}", workflows);
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            task,
            model,
            max_iterations,
            timeout,
            no_metaprompt,
            show_tests,
        } => {
            handle_run(
                task,
                model.clone(),
                *max_iterations,
                *timeout,
                *no_metaprompt,
                *show_tests,
                config,
            )
            .await
        }
        Commands::Metaprompt { command } => handle_metaprompt_command(command, config).await,
        Commands::Audit => handle_audit_command(config),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
