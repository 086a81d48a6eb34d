//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ConcurrencySetting, ConfigError, RunnerConfig};
use crate::discovery::SortOrder;
use crate::executor::{DelayStrategy, TimeoutStrategy};
use crate::output::{OutputFormat, ProgressStyle};
use crate::results::ReportFormat;

/// Concurrent test runner for service endpoints
#[derive(Parser, Debug)]
#[command(name = "svcprobe")]
#[command(version)]
#[command(about = "Discover and run service tests sequentially or in parallel")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test definitions
    Run(RunArgs),

    /// List discovered tests in scheduling order
    List(ListArgs),

    /// Inspect or create configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Test file or directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Worker count: a positive integer or 'auto'
    #[arg(short = 'j', long)]
    pub parallel: Option<String>,

    /// Per-test timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<f64>,

    /// Retries for transient failures
    #[arg(long)]
    pub retry: Option<u32>,

    /// Delay between retries in seconds
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// Disable retries and reachability checks
    #[arg(long)]
    pub no_retry: bool,

    /// Delay growth between retries
    #[arg(long, value_enum)]
    pub backoff: Option<DelayStrategy>,

    /// Test ordering
    #[arg(short, long, value_enum)]
    pub sort: Option<SortOrder>,

    /// List the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after the first failure (sequential runs only)
    #[arg(long)]
    pub fail_fast: bool,

    /// How the per-test timeout is enforced
    #[arg(long, value_enum)]
    pub timeout_strategy: Option<TimeoutStrategy>,

    /// Live progress display
    #[arg(long, value_enum)]
    pub progress: Option<ProgressStyle>,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Report file format
    #[arg(long, value_enum)]
    pub log_format: Option<ReportFormat>,

    /// Report file path
    #[arg(long)]
    pub log_output: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Apply flags on top of file and environment settings
    pub fn apply(&self, config: &mut RunnerConfig) -> Result<(), ConfigError> {
        if let Some(parallel) = &self.parallel {
            config.concurrency = parallel.parse::<ConcurrencySetting>()?;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(retry) = self.retry {
            config.retry_count = retry;
        }
        if let Some(delay) = self.retry_delay {
            config.retry_delay_secs = delay;
        }
        if self.no_retry {
            config.no_retry = true;
        }
        if let Some(backoff) = self.backoff {
            config.backoff = backoff;
        }
        if let Some(sort) = self.sort {
            config.sort = sort;
        }
        if self.fail_fast {
            config.fail_fast = true;
        }
        if let Some(strategy) = self.timeout_strategy {
            config.timeout_strategy = strategy;
        }
        if let Some(progress) = self.progress {
            config.progress = progress;
        }
        if let Some(format) = self.log_format {
            config.log_format = Some(format);
        }
        if let Some(path) = &self.log_output {
            config.log_output = Some(path.clone());
            // A path alone implies a format
            if config.log_format.is_none() {
                config.log_format = Some(report_format_for(path));
            }
        }
        Ok(())
    }
}

fn report_format_for(path: &std::path::Path) -> ReportFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => ReportFormat::Json,
        _ => ReportFormat::Junit,
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Test file or directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Test ordering
    #[arg(short, long, value_enum)]
    pub sort: Option<SortOrder>,

    /// Show file paths next to names
    #[arg(short, long)]
    pub detailed: bool,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write a configuration file with default values
    Init {
        /// Output path
        #[arg(short, long, default_value = "svcprobe.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List supported environment variables
    Env,
}
