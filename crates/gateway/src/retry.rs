//! Exponential backoff for retryable connector failures.

use std::future::Future;
use std::time::Duration;

use connector_hub_core::Result;

/// Backoff policy applied to every connector call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first attempt included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the outcome and the attempts used.
    ///
    /// The backoff is a `tokio::time::sleep`, so only the calling task waits.
    pub async fn execute_with_retry<T, F, Fut>(&self, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable connector failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_hub_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let started = Instant::now();

        let (result, attempts) = policy
            .execute_with_retry(move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::request_failed(Some(503), "unavailable"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts, 3);
        assert!(started.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_returned_immediately() {
        let policy = RetryPolicy::default();
        let (result, attempts) = policy
            .execute_with_retry(|_| async {
                Err::<(), _>(Error::request_failed(Some(404), "missing"))
            })
            .await;

        assert!(matches!(result, Err(Error::RequestFailed { status: Some(404), .. })));
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_propagates_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let (result, attempts) = policy
            .execute_with_retry(|_| async { Err::<(), _>(Error::timeout("slow")) })
            .await;

        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(attempts, 2);
    }
}
