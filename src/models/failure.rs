//! Failure classification for job attempts

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::JobStatus;

/// Classification of a terminal job failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkUnavailable,
    Timeout,
    AssertionMismatch,
    ProtocolError,
}

impl FailureKind {
    /// Only transport-level failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::NetworkUnavailable | FailureKind::Timeout)
    }

    /// Job status recorded once this failure is terminal
    pub fn status(&self) -> JobStatus {
        match self {
            FailureKind::NetworkUnavailable | FailureKind::AssertionMismatch => JobStatus::Failed,
            FailureKind::Timeout | FailureKind::ProtocolError => JobStatus::Error,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::NetworkUnavailable => "NetworkUnavailable",
            FailureKind::Timeout => "Timeout",
            FailureKind::AssertionMismatch => "AssertionMismatch",
            FailureKind::ProtocolError => "ProtocolError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error produced by a single job attempt
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Target unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Assertion mismatch: {0}")]
    AssertionMismatch(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::NetworkUnavailable(_) => FailureKind::NetworkUnavailable,
            ExecutionError::Timeout(_) => FailureKind::Timeout,
            ExecutionError::AssertionMismatch(_) => FailureKind::AssertionMismatch,
            ExecutionError::ProtocolError(_) => FailureKind::ProtocolError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExecutionError::NetworkUnavailable("refused".into()).is_retryable());
        assert!(ExecutionError::Timeout(100).is_retryable());
        assert!(!ExecutionError::AssertionMismatch("body".into()).is_retryable());
        assert!(!ExecutionError::ProtocolError("bad json".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(FailureKind::NetworkUnavailable.status(), JobStatus::Failed);
        assert_eq!(FailureKind::AssertionMismatch.status(), JobStatus::Failed);
        assert_eq!(FailureKind::Timeout.status(), JobStatus::Error);
        assert_eq!(FailureKind::ProtocolError.status(), JobStatus::Error);
    }
}
