//! Run scheduling
//!
//! The scheduler owns one run end to end: it prepares the run directory and
//! the result channel, starts the reader that feeds the aggregator, hands
//! jobs to workers, then collects the final report.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::parallel::run_parallel;
use super::worker::{Collaborators, ExecutionPolicy, Worker};
use super::EngineError;
use crate::channel::{
    result_channel, ChannelError, ChannelEvent, DrainConfig, EventJournal, ResultReceiver,
    RunDirectory,
};
use crate::config::ConcurrencyLevel;
use crate::models::{ExecutionResult, TestJob};
use crate::output::{OutputFormat, OutputHandle, ProgressStyle};
use crate::results::{Aggregator, RunReport};

/// Slack added to the reader's worst-case wall time
const READER_SLACK: Duration = Duration::from_secs(5);

pub struct Scheduler {
    collaborators: Collaborators,
    policy: ExecutionPolicy,
    output: OutputHandle,
    style: ProgressStyle,
    channel_capacity: usize,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        collaborators: Collaborators,
        policy: ExecutionPolicy,
        output: OutputHandle,
    ) -> Self {
        Self {
            collaborators,
            policy,
            output,
            style: ProgressStyle::default(),
            channel_capacity: 256,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_style(mut self, style: ProgressStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_channel(mut self, capacity: usize, poll_interval: Duration) -> Self {
        self.channel_capacity = capacity;
        self.poll_interval = poll_interval;
        self
    }

    /// Run every job and return the finalized report.
    ///
    /// With a sequential level and `fail_fast`, the first failing job stops
    /// dispatch and every later job is recorded as skipped.
    pub async fn run(
        &self,
        jobs: &[TestJob],
        concurrency: ConcurrencyLevel,
        fail_fast: bool,
    ) -> Result<RunReport, EngineError> {
        let run_dir = RunDirectory::create().map_err(EngineError::RunDirectory)?;
        self.run_in(run_dir, jobs, concurrency, fail_fast).await
    }

    /// Same as `run`, inside a prepared run directory that is removed on
    /// every exit path
    pub(crate) async fn run_in(
        &self,
        run_dir: RunDirectory,
        jobs: &[TestJob],
        concurrency: ConcurrencyLevel,
        fail_fast: bool,
    ) -> Result<RunReport, EngineError> {
        let total = jobs.len() as u64;
        let journal = run_dir.open_journal().map_err(EngineError::RunDirectory)?;
        debug!("Run directory: {}", run_dir.path().display());

        let (events, receiver) = result_channel(self.channel_capacity);
        let dropped = events.drop_counter();
        let drain = DrainConfig::for_run(
            self.poll_interval,
            total.saturating_mul(3),
            self.worst_case(jobs.len(), concurrency),
        );
        let aggregator = Aggregator::new(total);
        let live = aggregator.live();
        let reader = tokio::spawn(collect(receiver, aggregator, journal, drain));

        info!(
            "Running {} jobs with concurrency {}{}",
            total,
            concurrency,
            if fail_fast && concurrency.is_sequential() {
                " (fail-fast)"
            } else {
                ""
            }
        );

        let worker = Worker::new(
            self.collaborators.clone(),
            self.policy,
            self.output.clone(),
            events,
        )
        .with_style(self.style);

        let dispatched = if concurrency.is_sequential() {
            run_sequential(worker, jobs, fail_fast).await
        } else {
            run_parallel(worker, jobs, concurrency).await
        };

        debug!(
            "Dispatch finished: {} of {} jobs recorded so far, {} progress events",
            live.completed(),
            total,
            live.progress()
        );

        // Every sender is gone once dispatch returns, so the reader ends
        let Collected {
            mut aggregator,
            rejected,
        } = match reader.await {
            Ok(collected) => collected?,
            Err(err) => return Err(EngineError::Reader(err.to_string())),
        };
        dispatched?;

        // Terminate the line of progress symbols
        if self.style == ProgressStyle::Symbols && total > 0 {
            self.output.print_line("")?;
        }
        self.output.flush().await?;

        if let Err(err) = run_dir.close() {
            warn!("Failed to remove run directory: {}", err);
        }

        let received = aggregator.received();
        debug!(
            "Reader closed: {} results, {} rejected, {} worker faults, {} progress events dropped",
            received,
            rejected,
            aggregator.faults().len(),
            dropped.load(Ordering::Relaxed)
        );
        check_complete(total, received, rejected)?;

        aggregator.finalize();
        let summary = aggregator.render_stats(OutputFormat::Summary);
        info!("Run finished: {summary}");

        let mut report = aggregator.into_report();
        order_by_dispatch(&mut report.results, jobs);
        Ok(report)
    }

    /// Wall-time bound for the whole run, used to size the reader's cap
    fn worst_case(&self, jobs: usize, concurrency: ConcurrencyLevel) -> Duration {
        let waves = jobs.div_ceil(concurrency.get()).max(1);
        let waves = u32::try_from(waves).unwrap_or(u32::MAX);
        self.policy
            .worst_case_per_job()
            .saturating_mul(waves)
            .saturating_add(READER_SLACK)
    }
}

async fn run_sequential(
    worker: Worker,
    jobs: &[TestJob],
    fail_fast: bool,
) -> Result<(), EngineError> {
    for (index, job) in jobs.iter().enumerate() {
        let result = worker.run(job).await?;

        if fail_fast && result.status.is_failure() {
            let remaining = &jobs[index + 1..];
            info!(
                "Fail-fast: {} failed, skipping {} remaining jobs",
                job.display_name,
                remaining.len()
            );
            for skipped in remaining {
                let reason = format!("skipped after {} failed (fail-fast)", job.display_name);
                let result = ExecutionResult::skipped(skipped, reason);
                worker.emit(&result).await?;
            }
            break;
        }
    }
    Ok(())
}

/// Aggregator plus the number of results it refused
struct Collected {
    aggregator: Aggregator,
    rejected: u64,
}

/// Reader loop: journal every event and feed the aggregator
async fn collect(
    receiver: ResultReceiver,
    mut aggregator: Aggregator,
    mut journal: EventJournal,
    config: DrainConfig,
) -> Result<Collected, ChannelError> {
    let mut rejected = 0u64;
    let report = receiver
        .drain(config, |event| {
            journal.record(&event)?;
            match event {
                ChannelEvent::Progress(progress) => aggregator.on_progress(&progress),
                ChannelEvent::Result(result) => {
                    if aggregator.on_result(result).is_err() {
                        rejected += 1;
                    }
                }
                ChannelEvent::Error(fault) => aggregator.on_fault(fault),
            }
            Ok(())
        })
        .await?;

    let entries = journal.finish()?;
    debug!(
        "Journal closed with {} entries ({} idle polls)",
        entries, report.idle_polls
    );
    Ok(Collected {
        aggregator,
        rejected,
    })
}

/// Every dispatched job must have exactly one accepted result
fn check_complete(expected: u64, received: u64, rejected: u64) -> Result<(), EngineError> {
    if received != expected || rejected > 0 {
        return Err(EngineError::IncompleteRun {
            expected,
            received,
            rejected,
        });
    }
    Ok(())
}

fn order_by_dispatch(results: &mut [ExecutionResult], jobs: &[TestJob]) {
    let position: HashMap<&str, usize> = jobs
        .iter()
        .enumerate()
        .map(|(i, job)| (job.id.as_str(), i))
        .collect();
    results.sort_by_key(|r| position.get(r.job_id.as_str()).map_or(usize::MAX, |&i| i));
}
