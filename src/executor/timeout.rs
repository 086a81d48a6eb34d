//! Bounded execution of a single unit of work
//!
//! `Native` relies on `tokio::time::timeout`, which drops the future at the
//! deadline. `Watchdog` runs the work as its own task and escalates through
//! an explicit state machine:
//!
//! ```text
//! Running ──timeout──▶ GracefulCancelRequested ──grace──▶ ForceCancelled
//! ```
//!
//! The graceful phase fires the work's `CancellationToken`; if the work has
//! not returned when the grace period ends, its task is aborted.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How the per-job timeout is enforced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutStrategy {
    #[default]
    Native,
    Watchdog,
}

/// Cancellation phase of a watched unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancelPhase {
    Running,
    GracefulCancelRequested,
    ForceCancelled,
}

/// Forward-only phase tracker
#[derive(Debug)]
pub struct CancelState {
    phase: CancelPhase,
}

impl CancelState {
    pub fn new() -> Self {
        Self {
            phase: CancelPhase::Running,
        }
    }

    pub fn phase(&self) -> CancelPhase {
        self.phase
    }

    /// Move to `next`; phases never go backwards
    pub fn advance(&mut self, next: CancelPhase) -> bool {
        if next > self.phase {
            debug!("Cancel phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
            true
        } else {
            false
        }
    }
}

impl Default for CancelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of bounded execution
#[derive(Debug, PartialEq, Eq)]
pub enum Bounded<T> {
    Completed(T),
    /// Deadline passed; carries the phase in which the unit ended
    TimedOut(CancelPhase),
}

/// Bound a future with the runtime's native timer
pub async fn run_native<F>(limit: Duration, work: F) -> Bounded<F::Output>
where
    F: Future,
{
    match timeout(limit, work).await {
        Ok(value) => Bounded::Completed(value),
        Err(_) => Bounded::TimedOut(CancelPhase::ForceCancelled),
    }
}

/// Two-phase watchdog
#[derive(Clone, Copy, Debug)]
pub struct Watchdog {
    limit: Duration,
    grace: Duration,
}

impl Watchdog {
    pub fn new(limit: Duration, grace: Duration) -> Self {
        Self { limit, grace }
    }

    /// Run `work` under the watchdog. A panic inside the work resumes on
    /// the caller's task.
    pub async fn run<T, F, Fut>(&self, work: F) -> Bounded<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let mut state = CancelState::new();
        let mut handle = tokio::spawn(work(token.clone()));

        tokio::select! {
            joined = &mut handle => {
                return match unwrap_join(joined) {
                    Some(value) => Bounded::Completed(value),
                    None => Bounded::TimedOut(CancelPhase::ForceCancelled),
                };
            }
            _ = sleep(self.limit) => {}
        }

        state.advance(CancelPhase::GracefulCancelRequested);
        token.cancel();

        match timeout(self.grace, &mut handle).await {
            Ok(joined) => {
                // Finished within grace; still over the deadline
                let _ = unwrap_join(joined);
            }
            Err(_) => {
                handle.abort();
                state.advance(CancelPhase::ForceCancelled);
            }
        }

        Bounded::TimedOut(state.phase())
    }
}

/// `None` when the task was cancelled from outside, e.g. runtime shutdown
fn unwrap_join<T>(joined: Result<T, tokio::task::JoinError>) -> Option<T> {
    match joined {
        Ok(value) => Some(value),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_completes_in_time() {
        let outcome = run_native(Duration::from_millis(200), async { 7 }).await;
        assert_eq!(outcome, Bounded::Completed(7));
    }

    #[tokio::test]
    async fn test_native_times_out() {
        let outcome = run_native(Duration::from_millis(20), sleep(Duration::from_secs(5))).await;
        assert_eq!(outcome, Bounded::TimedOut(CancelPhase::ForceCancelled));
    }

    #[tokio::test]
    async fn test_watchdog_completes_in_time() {
        let watchdog = Watchdog::new(Duration::from_millis(200), Duration::from_millis(50));
        let outcome = watchdog.run(|_token| async { "done" }).await;
        assert_eq!(outcome, Bounded::Completed("done"));
    }

    #[tokio::test]
    async fn test_watchdog_graceful_cancel() {
        let watchdog = Watchdog::new(Duration::from_millis(20), Duration::from_millis(500));
        let outcome = watchdog
            .run(|token| async move {
                token.cancelled().await;
                "stopped"
            })
            .await;
        assert_eq!(
            outcome,
            Bounded::TimedOut(CancelPhase::GracefulCancelRequested)
        );
    }

    #[tokio::test]
    async fn test_watchdog_force_cancel() {
        let watchdog = Watchdog::new(Duration::from_millis(20), Duration::from_millis(20));
        let outcome = watchdog
            .run(|_token| async {
                sleep(Duration::from_secs(30)).await;
                "never"
            })
            .await;
        assert_eq!(outcome, Bounded::TimedOut(CancelPhase::ForceCancelled));
    }

    #[test]
    fn test_cancel_state_is_forward_only() {
        let mut state = CancelState::new();
        assert!(state.advance(CancelPhase::GracefulCancelRequested));
        assert!(state.advance(CancelPhase::ForceCancelled));
        assert!(!state.advance(CancelPhase::Running));
        assert_eq!(state.phase(), CancelPhase::ForceCancelled);
    }
}
