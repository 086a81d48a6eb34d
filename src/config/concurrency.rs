//! Concurrency level resolution
//!
//! Auto-detection walks a fixed chain of probes and falls back to a
//! conservative default, so the resolved level is always positive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use tracing::debug;

use super::ConfigError;

/// Used when every detection probe fails
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Requested concurrency, as written by the user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConcurrency", into = "String")]
pub enum ConcurrencySetting {
    Auto,
    Fixed(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConcurrency {
    Count(i64),
    Text(String),
}

impl TryFrom<RawConcurrency> for ConcurrencySetting {
    type Error = ConfigError;

    fn try_from(raw: RawConcurrency) -> Result<Self, Self::Error> {
        match raw {
            RawConcurrency::Count(n) => n.to_string().parse(),
            RawConcurrency::Text(s) => s.parse(),
        }
    }
}

impl From<ConcurrencySetting> for String {
    fn from(setting: ConcurrencySetting) -> Self {
        setting.to_string()
    }
}

impl FromStr for ConcurrencySetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(ConcurrencySetting::Auto);
        }

        match trimmed.parse::<i64>() {
            Ok(n) if n > 0 => Ok(ConcurrencySetting::Fixed(n as usize)),
            _ => Err(ConfigError::InvalidConcurrency(s.to_string())),
        }
    }
}

impl fmt::Display for ConcurrencySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencySetting::Auto => write!(f, "auto"),
            ConcurrencySetting::Fixed(n) => write!(f, "{n}"),
        }
    }
}

impl ConcurrencySetting {
    /// Resolve once before dispatch
    pub fn resolve(&self) -> Result<ConcurrencyLevel, ConfigError> {
        match self {
            ConcurrencySetting::Auto => Ok(detect_concurrency()),
            ConcurrencySetting::Fixed(n) => ConcurrencyLevel::new(*n)
                .ok_or_else(|| ConfigError::InvalidConcurrency(n.to_string())),
        }
    }
}

/// Resolved worker count, always at least one
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConcurrencyLevel(NonZeroUsize);

impl ConcurrencyLevel {
    pub fn new(n: usize) -> Option<Self> {
        NonZeroUsize::new(n).map(Self)
    }

    pub fn sequential() -> Self {
        Self(NonZeroUsize::MIN)
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }

    pub fn is_sequential(&self) -> bool {
        self.get() == 1
    }
}

impl fmt::Display for ConcurrencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

type Probe<'a> = (&'static str, &'a dyn Fn() -> Option<usize>);

/// Detect processing units: native query, then OS query, then default
pub fn detect_concurrency() -> ConcurrencyLevel {
    let probes: [Probe<'_>; 2] = [
        ("available_parallelism", &native_probe),
        ("os_query", &os_probe),
    ];
    detect_with(&probes)
}

pub(crate) fn detect_with(probes: &[Probe<'_>]) -> ConcurrencyLevel {
    for (name, probe) in probes {
        if let Some(level) = probe().and_then(ConcurrencyLevel::new) {
            debug!("Concurrency detected via {}: {}", name, level);
            return level;
        }
        debug!("Concurrency probe {} failed", name);
    }

    debug!("All concurrency probes failed, using {DEFAULT_CONCURRENCY}");
    ConcurrencyLevel::new(DEFAULT_CONCURRENCY).unwrap_or_else(ConcurrencyLevel::sequential)
}

fn native_probe() -> Option<usize> {
    std::thread::available_parallelism().ok().map(NonZeroUsize::get)
}

#[cfg(target_os = "linux")]
fn os_probe() -> Option<usize> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    let count = cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count();
    (count > 0).then_some(count)
}

#[cfg(target_os = "macos")]
fn os_probe() -> Option<usize> {
    let output = std::process::Command::new("sysctl")
        .args(["-n", "hw.ncpu"])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

#[cfg(windows)]
fn os_probe() -> Option<usize> {
    std::env::var("NUMBER_OF_PROCESSORS").ok()?.parse().ok()
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn os_probe() -> Option<usize> {
    None
}
