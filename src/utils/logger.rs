//! Logging utilities
//!
//! Logs go to stderr; stdout belongs to the synchronized progress stream.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Variable that overrides the filter built from the log level
pub const LOG_ENV: &str = "SVCPROBE_LOG";

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    fn directive(self) -> String {
        format!("svcprobe={}", self.to_tracing_level())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Filter from `SVCPROBE_LOG` when set and valid, else from `level`
fn build_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.directive()))
}

/// Initialize the logger with specified level
pub fn init_logger(level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let filter = build_filter(level, directives.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse(), Ok(LogLevel::Info));
        assert_eq!("DEBUG".parse(), Ok(LogLevel::Debug));
        assert!("unknown".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_filter_override() {
        let filter = build_filter(LogLevel::Warn, Some("svcprobe=trace"));
        assert_eq!(filter.to_string(), "svcprobe=trace");

        let filter = build_filter(LogLevel::Debug, None);
        assert_eq!(filter.to_string(), "svcprobe=debug");
    }
}
