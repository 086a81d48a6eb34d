//! Output for test runs
//!
//! Console serialization for concurrent workers and result formatting.

mod formatter;
mod sync;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use formatter::{should_colorize, OutputFormat, ResultFormatter};
pub use sync::{OutputError, OutputHandle, SynchronizedOutput};

/// Live progress display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    /// One status symbol per finished job
    #[default]
    Symbols,
    /// One line per finished job
    Lines,
    /// Nothing until the summary
    Quiet,
}
