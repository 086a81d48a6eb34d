//! Configuration module
//!
//! Handles loading, layering and validating runner configuration.
//! Precedence, lowest first: defaults, config file, environment, CLI flags.

mod concurrency;
mod env;
mod file;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use concurrency::{ConcurrencyLevel, ConcurrencySetting};
pub use env::{print_env_help, EnvConfig};
pub use file::find_config_file;

use crate::discovery::SortOrder;
use crate::executor::{DelayStrategy, ExecutionPolicy, RetryPolicy, TimeoutStrategy};
use crate::output::ProgressStyle;
use crate::results::ReportFormat;

/// Longest accepted per-job timeout, one day
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Longest accepted wait between retries, one hour
const MAX_RETRY_DELAY_SECS: f64 = 3_600.0;

/// Most retries a single job may make
const MAX_RETRIES: u32 = 100;

/// Fatal configuration errors, raised before any job is dispatched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid concurrency level '{0}': expected a positive integer or 'auto'")]
    InvalidConcurrency(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid retry setting: {0}")]
    InvalidRetry(String),

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Runner configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Worker count, a positive integer or "auto"
    pub concurrency: ConcurrencySetting,

    /// Per-job timeout in seconds
    pub timeout_secs: f64,

    /// Retries after the first attempt for transient failures
    pub retry_count: u32,

    /// Delay before the first retry, in seconds
    pub retry_delay_secs: f64,

    /// Upper bound for exponential backoff, in seconds
    pub max_retry_delay_secs: f64,

    /// Delay growth between retries
    pub backoff: DelayStrategy,

    /// Disable retries and pre-flight reachability checks
    pub no_retry: bool,

    /// Abort remaining jobs after the first failure (sequential only)
    pub fail_fast: bool,

    /// Job ordering
    pub sort: SortOrder,

    /// How the per-job timeout is enforced
    pub timeout_strategy: TimeoutStrategy,

    /// Grace period between cooperative and forced cancellation
    pub grace_period_ms: u64,

    /// Timeout for a single reachability probe
    pub probe_timeout_ms: u64,

    /// Result channel capacity
    pub channel_capacity: usize,

    /// Reader poll interval
    pub poll_interval_ms: u64,

    /// Test file extensions picked up during discovery
    pub extensions: Vec<String>,

    /// Live progress display
    pub progress: ProgressStyle,

    /// Report format written after the run
    pub log_format: Option<ReportFormat>,

    /// Report destination
    pub log_output: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencySetting::Fixed(1),
            timeout_secs: 30.0,
            retry_count: 3,
            retry_delay_secs: 1.0,
            max_retry_delay_secs: 30.0,
            backoff: DelayStrategy::Fixed,
            no_retry: false,
            fail_fast: false,
            sort: SortOrder::Path,
            timeout_strategy: TimeoutStrategy::Native,
            grace_period_ms: 1000,
            probe_timeout_ms: 3000,
            channel_capacity: 256,
            poll_interval_ms: 100,
            extensions: vec!["yaml".to_string(), "yml".to_string(), "json".to_string()],
            progress: ProgressStyle::Symbols,
            log_format: None,
            log_output: None,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if file::is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        Ok(config)
    }

    /// Load the explicit file, else the first file found in standard locations
    pub fn load_layered(explicit: Option<&Path>, env: &EnvConfig) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.clone())
            .or_else(find_config_file);

        let mut config = match path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };

        env.apply(&mut config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if file::is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate all values; must pass before dispatch
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let ConcurrencySetting::Fixed(0) = self.concurrency {
            return Err(ConfigError::InvalidConcurrency("0".to_string()));
        }

        // Also rejects NaN
        if !(self.timeout_secs > 0.0 && self.timeout_secs <= MAX_TIMEOUT_SECS) {
            return Err(ConfigError::InvalidTimeout(format!(
                "expected a number of seconds in (0, {MAX_TIMEOUT_SECS}], got {}",
                self.timeout_secs
            )));
        }

        if self.retry_count > MAX_RETRIES {
            return Err(ConfigError::InvalidRetry(format!(
                "at most {MAX_RETRIES} retries are allowed, got {}",
                self.retry_count
            )));
        }

        for (name, value) in [
            ("retry delay", self.retry_delay_secs),
            ("max retry delay", self.max_retry_delay_secs),
        ] {
            if !(0.0..=MAX_RETRY_DELAY_SECS).contains(&value) {
                return Err(ConfigError::InvalidRetry(format!(
                    "{name} must be in [0, {MAX_RETRY_DELAY_SECS}] seconds, got {value}"
                )));
            }
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "channel_capacity",
                message: "must be at least 1".to_string(),
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                message: "must be at least 1".to_string(),
            });
        }

        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "extensions",
                message: "at least one test file extension is required".to_string(),
            });
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.no_retry {
            return RetryPolicy::disabled();
        }

        let delay = Duration::from_secs_f64(self.retry_delay_secs);
        RetryPolicy::new(self.retry_count, delay)
            .with_strategy(self.backoff)
            .with_max_delay(Duration::from_secs_f64(self.max_retry_delay_secs))
    }

    /// Per-job execution policy; call after `validate`
    pub fn execution_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            timeout: Duration::from_secs_f64(self.timeout_secs),
            retry: self.retry_policy(),
            timeout_strategy: self.timeout_strategy,
            grace_period: Duration::from_millis(self.grace_period_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.concurrency, ConcurrencySetting::Fixed(1));
        assert_eq!(config.retry_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let config = RunnerConfig {
            timeout_secs: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        for timeout_secs in [1e300, f64::INFINITY, f64::NAN, MAX_TIMEOUT_SECS + 1.0] {
            let config = RunnerConfig {
                timeout_secs,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
        }

        let config = RunnerConfig {
            timeout_secs: MAX_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.execution_policy().timeout,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_oversized_retry_settings_rejected() {
        let config = RunnerConfig {
            retry_count: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));

        let config = RunnerConfig {
            max_retry_delay_secs: 1e300,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));

        let config = RunnerConfig {
            retry_count: MAX_RETRIES,
            retry_delay_secs: MAX_RETRY_DELAY_SECS,
            max_retry_delay_secs: MAX_RETRY_DELAY_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.execution_policy().worst_case_per_job() > Duration::from_secs(3_600));
    }

    #[test]
    fn test_negative_retry_delay_rejected() {
        let config = RunnerConfig {
            retry_delay_secs: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));
    }

    #[test]
    fn test_no_retry_disables_policy() {
        let config = RunnerConfig {
            no_retry: true,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert!(!policy.enabled);
        assert_eq!(policy.max_retries(), 0);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcprobe.yaml");

        let config = RunnerConfig {
            concurrency: ConcurrencySetting::Auto,
            fail_fast: true,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = RunnerConfig::load(&path).unwrap();
        assert_eq!(loaded.concurrency, ConcurrencySetting::Auto);
        assert!(loaded.fail_fast);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcprobe.yml");
        std::fs::write(&path, "concurrency: 8\ntimeout_secs: 5\n").unwrap();

        let loaded = RunnerConfig::load(&path).unwrap();
        assert_eq!(loaded.concurrency, ConcurrencySetting::Fixed(8));
        assert_eq!(loaded.timeout_secs, 5.0);
        assert_eq!(loaded.retry_count, 3);
    }
}
