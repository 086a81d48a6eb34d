//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConcurrencySetting, ConfigError, RunnerConfig};

/// Environment variable prefix
const ENV_PREFIX: &str = "SVCPROBE";

/// Overrides read from SVCPROBE_* variables; numeric values stay raw until
/// `apply` so a malformed one is reported instead of ignored
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// SVCPROBE_PARALLEL
    pub parallel: Option<String>,
    /// SVCPROBE_TIMEOUT
    pub timeout: Option<String>,
    /// SVCPROBE_RETRY
    pub retry: Option<String>,
    /// SVCPROBE_RETRY_DELAY
    pub retry_delay: Option<String>,
    /// SVCPROBE_NO_RETRY
    pub no_retry: Option<bool>,
    /// SVCPROBE_FAIL_FAST
    pub fail_fast: Option<bool>,
    /// SVCPROBE_CONFIG
    pub config_file: Option<PathBuf>,
    /// SVCPROBE_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary lookup, keyed by the full variable name
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));

        Self {
            parallel: get("PARALLEL"),
            timeout: get("TIMEOUT"),
            retry: get("RETRY"),
            retry_delay: get("RETRY_DELAY"),
            no_retry: get("NO_RETRY").map(|v| parse_bool(&v)),
            fail_fast: get("FAIL_FAST").map(|v| parse_bool(&v)),
            config_file: get("CONFIG").map(PathBuf::from),
            verbose: get("VERBOSE").map(|v| parse_bool(&v)),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.parallel.is_some()
            || self.timeout.is_some()
            || self.retry.is_some()
            || self.retry_delay.is_some()
            || self.no_retry.is_some()
            || self.fail_fast.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
    }

    /// Layer the overrides onto a loaded configuration
    pub fn apply(&self, config: &mut RunnerConfig) -> Result<(), ConfigError> {
        if let Some(parallel) = &self.parallel {
            config.concurrency = parallel.parse::<ConcurrencySetting>()?;
        }
        if let Some(timeout) = &self.timeout {
            config.timeout_secs = parse_value("TIMEOUT", timeout, "number of seconds")
                .map_err(ConfigError::InvalidTimeout)?;
        }
        if let Some(retry) = &self.retry {
            config.retry_count = parse_value("RETRY", retry, "retry count")
                .map_err(ConfigError::InvalidRetry)?;
        }
        if let Some(delay) = &self.retry_delay {
            config.retry_delay_secs = parse_value("RETRY_DELAY", delay, "number of seconds")
                .map_err(ConfigError::InvalidRetry)?;
        }
        if let Some(no_retry) = self.no_retry {
            config.no_retry = no_retry;
        }
        if let Some(fail_fast) = self.fail_fast {
            config.fail_fast = fail_fast;
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str, expected: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{ENV_PREFIX}_{name}='{raw}' is not a valid {expected}"))
}

fn parse_bool(v: &str) -> bool {
    matches!(
        v.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all SVCPROBE environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PARALLEL     Worker count (integer or 'auto')");
    println!("  {ENV_PREFIX}_TIMEOUT      Per-test timeout in seconds");
    println!("  {ENV_PREFIX}_RETRY        Retry count for transient failures");
    println!("  {ENV_PREFIX}_RETRY_DELAY  Delay between retries in seconds");
    println!("  {ENV_PREFIX}_NO_RETRY     Disable retries and reachability checks");
    println!("  {ENV_PREFIX}_FAIL_FAST    Stop after the first failure (sequential runs)");
    println!("  {ENV_PREFIX}_CONFIG       Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE      Enable verbose output");
    println!("  {ENV_PREFIX}_LOG          Log filter (tracing env-filter syntax)");
}
