//! svcprobe - concurrent test runner for service endpoints
//!
//! Discovers test definition files, runs them sequentially or with bounded
//! parallelism, and reports per-test progress plus a final summary.
//!
//! ## Usage
//!
//! ```bash
//! # Run every test under ./tests, four at a time
//! svcprobe run tests --parallel 4
//!
//! # Sequential run that stops at the first failure
//! svcprobe run tests --fail-fast
//!
//! # Write a JUnit report for CI
//! svcprobe run tests --parallel auto --log-format junit --log-output report.xml
//!
//! # Show the execution plan only
//! svcprobe run tests --dry-run --sort name
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod channel;
mod cli;
mod config;
mod discovery;
mod executor;
mod http;
mod models;
mod output;
mod results;
mod utils;

use cli::Args;
use config::{print_env_help, ConcurrencyLevel, EnvConfig, RunnerConfig};
use discovery::JobSource;
use executor::{Collaborators, FileDefinitionLoader, Scheduler};
use http::{HttpExecutor, TcpProbe};
use models::TestJob;
use output::{should_colorize, ResultFormatter, SynchronizedOutput};
use results::{JsonComparator, ReportEmitter};
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = if args.verbose || env.verbose.unwrap_or(false) {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => run_tests(run_args, &env).await,
        cli::Command::List(list_args) => {
            list_jobs(list_args, &env)?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &env)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_tests(args: cli::RunArgs, env: &EnvConfig) -> Result<ExitCode> {
    let mut config = RunnerConfig::load_layered(args.config.as_deref(), env)?;
    args.apply(&mut config)?;
    config.validate()?;
    let concurrency = config.concurrency.resolve()?;

    let jobs = discover(&args.path, &config)?;

    if args.dry_run {
        print_plan(&jobs, &config, concurrency);
        return Ok(ExitCode::SUCCESS);
    }

    let collaborators = Collaborators::new(
        Arc::new(HttpExecutor::new().context("Failed to create HTTP client")?),
        Arc::new(JsonComparator),
        Arc::new(TcpProbe),
        Arc::new(FileDefinitionLoader),
    );

    let output = SynchronizedOutput::stdout();
    let scheduler = Scheduler::new(collaborators, config.execution_policy(), output.handle())
        .with_style(config.progress)
        .with_channel(
            config.channel_capacity,
            Duration::from_millis(config.poll_interval_ms),
        );

    let report = scheduler.run(&jobs, concurrency, config.fail_fast).await?;
    drop(scheduler);

    let formatter = if should_colorize() {
        ResultFormatter::new(args.format)
    } else {
        ResultFormatter::new(args.format).no_color()
    };
    let handle = output.handle();
    handle.print_line(formatter.format_report(&report))?;
    drop(handle);
    output.close().await?;

    if let Some(format) = config.log_format {
        let path = config
            .log_output
            .clone()
            .unwrap_or_else(|| format.default_path());
        ReportEmitter::new("svcprobe").emit(&report, format, &path)?;
    }

    if report.stats.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn discover(path: &Path, config: &RunnerConfig) -> Result<Vec<TestJob>> {
    let jobs = JobSource::new(path)
        .with_extensions(config.extensions.clone())
        .with_sort(config.sort)
        .jobs()?;
    info!("Discovered {} tests under {}", jobs.len(), path.display());
    Ok(jobs)
}

fn print_plan(jobs: &[TestJob], config: &RunnerConfig, concurrency: ConcurrencyLevel) {
    println!("\nExecution plan ({} tests)\n", jobs.len());
    println!("  Concurrency: {concurrency}");
    println!(
        "  Timeout:     {}s ({:?})",
        config.timeout_secs, config.timeout_strategy
    );
    if config.no_retry {
        println!("  Retries:     disabled");
    } else {
        println!(
            "  Retries:     {} ({:?}, {}s delay)",
            config.retry_count, config.backoff, config.retry_delay_secs
        );
    }
    if config.fail_fast && concurrency.is_sequential() {
        println!("  Fail-fast:   on");
    }
    println!();

    for (index, job) in jobs.iter().enumerate() {
        println!(
            "  {:3}. {:30} {}",
            index + 1,
            job.display_name,
            job.path.display()
        );
    }
    println!();
}

fn list_jobs(args: cli::ListArgs, env: &EnvConfig) -> Result<()> {
    let mut config = RunnerConfig::load_layered(args.config.as_deref(), env)?;
    if let Some(sort) = args.sort {
        config.sort = sort;
    }

    let jobs = discover(&args.path, &config)?;
    println!("\nDiscovered tests ({} total)\n", jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        if args.detailed {
            println!(
                "  {:3}. {:30} {}",
                index + 1,
                job.display_name,
                job.path.display()
            );
        } else {
            println!("  {:3}. {}", index + 1, job.display_name);
        }
    }
    println!();
    Ok(())
}

fn manage_config(args: cli::ConfigArgs, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show { config, format } => {
            let config = RunnerConfig::load_layered(config.as_deref(), env)?;
            let rendered = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{rendered}");
        }

        cli::ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }
            RunnerConfig::default().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
        }

        cli::ConfigAction::Env => {
            print_env_help();
            if env.has_any() {
                println!();
                println!("Active overrides: {env:?}");
            }
        }
    }

    Ok(())
}
