//! Test execution engine
//!
//! Provides sequential and bounded-parallel job execution with retries,
//! timeouts and a single aggregating reader.

mod collaborators;
mod parallel;
mod retry;
mod runner;
mod timeout;
mod worker;

use thiserror::Error;

pub use collaborators::{ComparisonEngine, FileDefinitionLoader, ReachabilityProbe, TestExecutor};
pub use retry::{DelayStrategy, RetryPolicy};
pub use runner::Scheduler;
pub use timeout::TimeoutStrategy;
pub use worker::{Collaborators, ExecutionPolicy};

#[cfg(test)]
pub(crate) use worker::testing;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::output::OutputError;

/// Failures that abort a whole run
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Run directory unavailable: {0}")]
    RunDirectory(#[source] std::io::Error),

    #[error("Result reader task failed: {0}")]
    Reader(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Worker pool closed before every job was dispatched")]
    PoolClosed,

    #[error("Run ended with {received} results for {expected} jobs ({rejected} rejected)")]
    IncompleteRun {
        expected: u64,
        received: u64,
        rejected: u64,
    },
}
