//! Result models for test execution
//!
//! Defines job statuses, per-job results, progress events and run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ExecutionError, FailureKind, TestJob};

/// Job execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl JobStatus {
    pub fn symbol(&self) -> char {
        match self {
            JobStatus::Passed => '✓',
            JobStatus::Failed => '✗',
            JobStatus::Skipped => '○',
            JobStatus::Error => '!',
        }
    }

    /// Failed or Error; both count against the run
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Passed => write!(f, "PASS"),
            JobStatus::Failed => write!(f, "FAIL"),
            JobStatus::Skipped => write!(f, "SKIP"),
            JobStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Lightweight live-display notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub symbol: char,
}

/// Outcome of a single job, written once and never mutated
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub job_id: String,
    pub display_name: String,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub error_detail: Option<String>,
    pub failure: Option<FailureKind>,
    /// Executor attempts made, including the first one
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn passed(
        job: &TestJob,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            display_name: job.display_name.clone(),
            status: JobStatus::Passed,
            duration_ms,
            error_detail: None,
            failure: None,
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Terminal failure; status follows the failure classification
    pub fn failed(
        job: &TestJob,
        error: &ExecutionError,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        let kind = error.kind();
        Self {
            job_id: job.id.clone(),
            display_name: job.display_name.clone(),
            status: kind.status(),
            duration_ms,
            error_detail: Some(error.to_string()),
            failure: Some(kind),
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(job: &TestJob, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job.id.clone(),
            display_name: job.display_name.clone(),
            status: JobStatus::Skipped,
            duration_ms: 0,
            error_detail: Some(reason.into()),
            failure: None,
            attempts: 0,
            started_at: now,
            finished_at: now,
        }
    }

    /// Unclassified worker fault, such as a panic inside the worker
    pub fn error(job: &TestJob, detail: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job.id.clone(),
            display_name: job.display_name.clone(),
            status: JobStatus::Error,
            duration_ms: 0,
            error_detail: Some(detail.into()),
            failure: None,
            attempts: 0,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    pub fn progress(&self) -> ProgressEvent {
        ProgressEvent {
            job_id: self.job_id.clone(),
            status: self.status,
            symbol: self.status.symbol(),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.display_name,
            self.duration_ms
        )?;
        if let Some(detail) = &self.error_detail {
            write!(f, " - {detail}")?;
        }
        Ok(())
    }
}

/// Run-wide counters owned by the aggregator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: u64,
    pub executed: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AggregateStats {
    /// Percentage of executed jobs that passed
    pub fn success_rate(&self) -> f64 {
        if self.executed == 0 {
            0.0
        } else {
            (self.passed as f64 / self.executed as f64) * 100.0
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Both accounting identities hold
    pub fn is_consistent(&self) -> bool {
        self.executed == self.passed + self.failed && self.total == self.executed + self.skipped
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0) as u64
    }
}

impl fmt::Display for AggregateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Executed: {} | Pass: {} | Fail: {} | Skip: {} | Success Rate: {:.1}%",
            self.total,
            self.executed,
            self.passed,
            self.failed,
            self.skipped,
            self.success_rate()
        )
    }
}
