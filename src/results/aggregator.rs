//! Run-wide result aggregation
//!
//! The aggregator is the only writer of run statistics. It is owned by the
//! channel reader; everything else reads either the live counters or the
//! frozen snapshot produced by `finalize`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, trace, warn};

use crate::channel::WorkerFault;
use crate::models::{AggregateStats, ExecutionResult, JobStatus, ProgressEvent};
use crate::output::OutputFormat;

/// Rejected aggregator input; always a bug in the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Result for {0} arrived after the run was finalized")]
    Finalized(String),

    #[error("Duplicate result for {0}")]
    Duplicate(String),

    #[error("Result for {job_id} exceeds the {total} dispatched jobs")]
    Overflow { job_id: String, total: u64 },
}

/// Counters readable while the run is in flight
#[derive(Debug, Default)]
pub struct LiveCounters {
    executed: AtomicU64,
    passed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    progress: AtomicU64,
}

impl LiveCounters {
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Acquire)
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    /// Jobs with a recorded result
    pub fn completed(&self) -> u64 {
        self.executed() + self.skipped()
    }
}

/// Final statistics plus the full result table
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub stats: AggregateStats,
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    #[cfg(test)]
    pub fn result_for(&self, job_id: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.job_id == job_id)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

pub struct Aggregator {
    total: u64,
    start_time: DateTime<Utc>,
    counters: Arc<LiveCounters>,
    results: Vec<ExecutionResult>,
    seen: HashSet<String>,
    faults: Vec<WorkerFault>,
    frozen: Option<AggregateStats>,
}

impl Aggregator {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            start_time: Utc::now(),
            counters: Arc::new(LiveCounters::default()),
            results: Vec::with_capacity(total as usize),
            seen: HashSet::with_capacity(total as usize),
            faults: Vec::new(),
            frozen: None,
        }
    }

    /// Shared read-only view of the counters
    pub fn live(&self) -> Arc<LiveCounters> {
        Arc::clone(&self.counters)
    }

    pub fn on_progress(&self, progress: &ProgressEvent) {
        self.counters.progress.fetch_add(1, Ordering::AcqRel);
        trace!(job = %progress.job_id, status = %progress.status, "Progress");
    }

    pub fn on_result(&mut self, result: ExecutionResult) -> Result<(), AggregatorError> {
        if self.frozen.is_some() {
            error!(job = %result.job_id, "Result received after finalize");
            return Err(AggregatorError::Finalized(result.job_id));
        }
        if self.seen.contains(&result.job_id) {
            error!(job = %result.job_id, "Duplicate result rejected");
            return Err(AggregatorError::Duplicate(result.job_id));
        }
        if self.results.len() as u64 >= self.total {
            error!(job = %result.job_id, total = self.total, "Result exceeds dispatched jobs");
            return Err(AggregatorError::Overflow {
                job_id: result.job_id,
                total: self.total,
            });
        }

        match result.status {
            JobStatus::Passed => {
                self.counters.passed.fetch_add(1, Ordering::AcqRel);
                self.counters.executed.fetch_add(1, Ordering::AcqRel);
            }
            JobStatus::Failed | JobStatus::Error => {
                self.counters.failed.fetch_add(1, Ordering::AcqRel);
                self.counters.executed.fetch_add(1, Ordering::AcqRel);
            }
            JobStatus::Skipped => {
                self.counters.skipped.fetch_add(1, Ordering::AcqRel);
            }
        }

        self.seen.insert(result.job_id.clone());
        self.results.push(result);
        Ok(())
    }

    pub fn on_fault(&mut self, fault: WorkerFault) {
        warn!(job = %fault.job_id, "Worker fault: {}", fault.message);
        self.faults.push(fault);
    }

    /// Point-in-time statistics, or the frozen snapshot once finalized
    pub fn stats(&self) -> AggregateStats {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }

        AggregateStats {
            total: self.total,
            executed: self.counters.executed(),
            passed: self.counters.passed(),
            failed: self.counters.failed(),
            skipped: self.counters.skipped(),
            start_time: self.start_time,
            end_time: None,
        }
    }

    /// Statistics rendered in the requested format
    pub fn render_stats(&self, format: OutputFormat) -> String {
        let stats = self.stats();
        match format {
            OutputFormat::Json => serde_json::to_string(&stats).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&stats).unwrap_or_default(),
            _ => stats.to_string(),
        }
    }

    /// Freeze the statistics; later calls return the same snapshot
    pub fn finalize(&mut self) -> AggregateStats {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }

        let mut stats = self.stats();
        stats.end_time = Some(Utc::now());
        if !stats.is_consistent() {
            warn!(
                "Run finalized with {} of {} results recorded",
                self.results.len(),
                self.total
            );
        }
        self.frozen = Some(stats.clone());
        stats
    }

    pub fn received(&self) -> u64 {
        self.results.len() as u64
    }

    pub fn faults(&self) -> &[WorkerFault] {
        &self.faults
    }

    /// Finalize and hand over the result table
    pub fn into_report(mut self) -> RunReport {
        let stats = self.finalize();
        RunReport {
            stats,
            results: self.results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionError, TestJob};

    fn job(id: &str) -> TestJob {
        TestJob::new(id, format!("{id}.yaml"), id)
    }

    fn passed(id: &str) -> ExecutionResult {
        ExecutionResult::passed(&job(id), Utc::now(), 5, 1)
    }

    #[test]
    fn test_counts_follow_status() {
        let mut agg = Aggregator::new(4);
        agg.on_result(passed("a")).unwrap();
        agg.on_result(ExecutionResult::failed(
            &job("b"),
            &ExecutionError::AssertionMismatch("x".into()),
            Utc::now(),
            1,
            1,
        ))
        .unwrap();
        let errored = ExecutionResult::error(&job("c"), "panic");
        agg.on_result(errored).unwrap();
        let skipped = ExecutionResult::skipped(&job("d"), "fail-fast");
        agg.on_result(skipped).unwrap();

        let stats = agg.finalize();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.executed, 3);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.skipped, 1);
        assert!(stats.is_consistent());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut agg = Aggregator::new(2);
        agg.on_result(passed("a")).unwrap();
        assert_eq!(
            agg.on_result(passed("a")),
            Err(AggregatorError::Duplicate("a".into()))
        );
        assert_eq!(agg.received(), 1);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut agg = Aggregator::new(1);
        agg.on_result(passed("a")).unwrap();
        assert!(matches!(
            agg.on_result(passed("b")),
            Err(AggregatorError::Overflow { total: 1, .. })
        ));
    }

    #[test]
    fn test_finalize_is_idempotent_and_frozen() {
        let mut agg = Aggregator::new(2);
        agg.on_result(passed("a")).unwrap();

        let first = agg.finalize();
        let second = agg.finalize();
        assert_eq!(first, second);

        assert_eq!(
            agg.on_result(passed("b")),
            Err(AggregatorError::Finalized("b".into()))
        );
        assert_eq!(agg.stats(), first);
    }

    #[test]
    fn test_live_counters_visible_before_finalize() {
        let mut agg = Aggregator::new(3);
        let live = agg.live();
        agg.on_result(passed("a")).unwrap();
        let skipped = ExecutionResult::skipped(&job("b"), "x");
        agg.on_result(skipped).unwrap();

        assert_eq!(live.passed(), 1);
        assert_eq!(live.completed(), 2);
        assert_eq!(agg.stats().end_time, None);
    }

    #[test]
    fn test_render_stats_json() {
        let mut agg = Aggregator::new(1);
        agg.on_result(passed("a")).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&agg.render_stats(OutputFormat::Json)).unwrap();
        assert_eq!(json["passed"], 1);
        assert!(agg.render_stats(OutputFormat::Table).contains("Pass: 1"));
    }

    #[test]
    fn test_render_stats_matches_report() {
        let mut agg = Aggregator::new(2);
        agg.on_result(passed("a")).unwrap();
        let skipped = ExecutionResult::skipped(&job("b"), "x");
        agg.on_result(skipped).unwrap();
        agg.on_fault(WorkerFault {
            job_id: "b".into(),
            message: "panicked".into(),
        });
        agg.finalize();

        let rendered = agg.render_stats(OutputFormat::Json);
        let summary = agg.render_stats(OutputFormat::Summary);
        assert_eq!(agg.faults().len(), 1);

        let report = agg.into_report();
        assert_eq!(rendered, serde_json::to_string(&report.stats).unwrap());
        assert_eq!(summary, report.stats.to_string());
        assert_eq!(report.count(JobStatus::Skipped), 1);
    }
}
