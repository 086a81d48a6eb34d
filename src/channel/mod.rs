//! Result channel between workers and the aggregator
//!
//! A bounded multi-producer/single-consumer queue carrying progress, result
//! and error events. The reader polls with a timeout and stops after a hard
//! iteration cap, so a stuck producer can never hang the run.

mod run_dir;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

pub use run_dir::{EventJournal, RunDirectory};

use crate::models::{ExecutionResult, ProgressEvent};

/// Channel and reader errors; any of these aborts the run
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Result channel closed")]
    Closed,

    #[error("Result reader exceeded its iteration cap of {0}")]
    IterationCapExceeded(u64),

    #[error("Event journal failed: {0}")]
    Journal(#[from] std::io::Error),
}

/// Fault raised by a worker outside normal result classification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFault {
    pub job_id: String,
    pub message: String,
}

/// Event kinds carried by the channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "lowercase")]
pub enum ChannelEvent {
    Progress(ProgressEvent),
    Result(ExecutionResult),
    Error(WorkerFault),
}

impl ChannelEvent {
    pub fn job_id(&self) -> &str {
        match self {
            ChannelEvent::Progress(p) => &p.job_id,
            ChannelEvent::Result(r) => &r.job_id,
            ChannelEvent::Error(e) => &e.job_id,
        }
    }
}

/// Create a channel with the given capacity
pub fn result_channel(capacity: usize) -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ResultSender {
            tx,
            dropped_progress: Arc::new(AtomicU64::new(0)),
        },
        ResultReceiver { rx },
    )
}

/// Producer side, cloned into every worker
#[derive(Clone, Debug)]
pub struct ResultSender {
    tx: mpsc::Sender<ChannelEvent>,
    dropped_progress: Arc<AtomicU64>,
}

impl ResultSender {
    /// Reliable send, waits for capacity
    pub async fn send(&self, event: ChannelEvent) -> Result<(), ChannelError> {
        self.tx.send(event).await.map_err(|_| ChannelError::Closed)
    }

    /// Best-effort progress; dropped when the channel is full
    pub fn send_progress(&self, progress: ProgressEvent) -> Result<(), ChannelError> {
        match self.tx.try_send(ChannelEvent::Progress(progress)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                self.dropped_progress.fetch_add(1, Ordering::Relaxed);
                trace!("Dropped progress event for {}", event.job_id());
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(ChannelError::Closed),
        }
    }

    pub async fn send_result(&self, result: ExecutionResult) -> Result<(), ChannelError> {
        self.send(ChannelEvent::Result(result)).await
    }

    pub async fn send_error(
        &self,
        job_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), ChannelError> {
        self.send(ChannelEvent::Error(WorkerFault {
            job_id: job_id.into(),
            message: message.into(),
        }))
        .await
    }

    /// Count of dropped progress events; holding it does not keep the
    /// channel open
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped_progress)
    }
}

/// Reader polling parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainConfig {
    pub poll_interval: Duration,
    pub max_iterations: u64,
}

impl DrainConfig {
    pub fn new(poll_interval: Duration, max_iterations: u64) -> Self {
        Self {
            poll_interval,
            max_iterations,
        }
    }

    /// Cap sized for a run: every expected event plus idle polls for the
    /// worst-case wall time of the run, doubled
    pub fn for_run(poll_interval: Duration, expected_events: u64, worst_case: Duration) -> Self {
        let poll_ms = poll_interval.as_millis().max(1);
        let idle_polls = (worst_case.as_millis() / poll_ms) as u64 + 1;
        let max_iterations = expected_events
            .saturating_add(idle_polls)
            .saturating_mul(2)
            .max(16);

        Self::new(poll_interval, max_iterations)
    }
}

/// Counts collected by one drain
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub progress: u64,
    pub results: u64,
    pub errors: u64,
    pub idle_polls: u64,
    pub iterations: u64,
}

/// Consumer side, owned by exactly one reader loop
#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::Receiver<ChannelEvent>,
}

impl ResultReceiver {
    /// Drain events until every sender is gone
    pub async fn drain<F>(
        mut self,
        config: DrainConfig,
        mut handler: F,
    ) -> Result<DrainReport, ChannelError>
    where
        F: FnMut(ChannelEvent) -> Result<(), ChannelError>,
    {
        let mut report = DrainReport::default();

        loop {
            if report.iterations >= config.max_iterations {
                warn!(
                    "Result reader hit iteration cap ({}) with {} results received",
                    config.max_iterations, report.results
                );
                return Err(ChannelError::IterationCapExceeded(config.max_iterations));
            }
            report.iterations += 1;

            match timeout(config.poll_interval, self.rx.recv()).await {
                Ok(Some(event)) => {
                    match &event {
                        ChannelEvent::Progress(_) => report.progress += 1,
                        ChannelEvent::Result(_) => report.results += 1,
                        ChannelEvent::Error(_) => report.errors += 1,
                    }
                    handler(event)?;
                }
                Ok(None) => break,
                Err(_) => report.idle_polls += 1,
            }
        }

        debug!(
            "Result reader finished: {} results, {} progress, {} errors, {} idle polls",
            report.results, report.progress, report.errors, report.idle_polls
        );
        Ok(report)
    }
}
