//! Retry policy for transient job failures
//!
//! Only failures classified as retryable (`NetworkUnavailable`, `Timeout`)
//! are attempted again; everything else is returned on first sight.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::ExecutionError;

/// Delay growth between attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DelayStrategy {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay doubles after every retry, capped at the maximum
    Exponential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub count: u32,
    pub delay: Duration,
    pub strategy: DelayStrategy,
    pub max_delay: Duration,
    /// Global switch; when off there are no retries and no reachability probes
    pub enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(count: u32, delay: Duration) -> Self {
        Self {
            count,
            delay,
            strategy: DelayStrategy::Fixed,
            max_delay: Duration::from_secs(30),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            count: 0,
            delay: Duration::ZERO,
            strategy: DelayStrategy::Fixed,
            max_delay: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn with_strategy(mut self, strategy: DelayStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        if self.enabled {
            self.count
        } else {
            0
        }
    }

    pub fn health_checks_enabled(&self) -> bool {
        self.enabled
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.strategy {
            DelayStrategy::Fixed => self.delay,
            DelayStrategy::Exponential => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                let cap = self.max_delay.max(self.delay);
                self.delay.saturating_mul(factor).min(cap)
            }
        }
    }

    /// Sum of every delay a fully exhausted job waits
    pub fn total_delay(&self) -> Duration {
        let retries = self.max_retries();
        if self.delay.is_zero() {
            return Duration::ZERO;
        }

        match self.strategy {
            DelayStrategy::Fixed => self.delay.saturating_mul(retries),
            DelayStrategy::Exponential => {
                let cap = self.max_delay.max(self.delay);
                let mut total = Duration::ZERO;
                for retry in 1..=retries {
                    let delay = self.delay_for(retry);
                    if delay >= cap {
                        // Every remaining retry waits the cap
                        let remaining = retries - retry + 1;
                        return total.saturating_add(cap.saturating_mul(remaining));
                    }
                    total = total.saturating_add(delay);
                }
                total
            }
        }
    }
}

/// Final outcome plus the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ExecutionError>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails terminally or retries run out
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExecutionError>>,
{
    let max_retries = policy.max_retries();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if !err.is_retryable() => {
                debug!(attempt, kind = %err.kind(), "Terminal failure, not retrying");
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }
            Err(err) => {
                let retry = attempt;
                if retry > max_retries {
                    debug!(attempt, "Retries exhausted: {}", err);
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }

                let delay = policy.delay_for(retry);
                warn!(
                    attempt,
                    retry,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    err
                );

                if delay.is_zero() {
                    yield_now().await;
                } else {
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(200));
        assert_eq!(policy.total_delay(), Duration::from_millis(600));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_strategy(DelayStrategy::Exponential)
            .with_max_delay(Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(10), Duration::from_millis(350));
        assert_eq!(policy.total_delay(), Duration::from_millis(1_350));
    }

    #[test]
    fn test_total_delay_with_huge_retry_count() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_millis(100))
            .with_strategy(DelayStrategy::Exponential)
            .with_max_delay(Duration::from_secs(1));
        let expected = Duration::from_millis(1_500)
            + Duration::from_secs(1).saturating_mul(u32::MAX - 4);
        assert_eq!(policy.total_delay(), expected);

        let fixed = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(fixed.total_delay(), Duration::MAX);
        let instant = RetryPolicy::new(u32::MAX, Duration::ZERO);
        assert_eq!(instant.total_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retries_until_exhausted() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = retry_with_policy(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExecutionError::NetworkUnavailable("refused".into())) }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            outcome.result,
            Err(ExecutionError::NetworkUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_assertion_mismatch_never_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let outcome: RetryOutcome<()> = retry_with_policy(&policy, |_| async {
            Err(ExecutionError::AssertionMismatch("body differs".into()))
        })
        .await;

        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let outcome = retry_with_policy(&policy, |attempt| async move {
            if attempt < 2 {
                Err(ExecutionError::Timeout(10))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_disabled_policy_makes_single_attempt() {
        let policy = RetryPolicy::disabled();

        let outcome: RetryOutcome<()> =
            retry_with_policy(&policy, |_| async { Err(ExecutionError::Timeout(5)) }).await;

        assert_eq!(outcome.attempts, 1);
        assert!(!policy.health_checks_enabled());
    }
}
