// Retry policy
//
// Bounded exponential backoff around one remote call. Only ambiguous
// transport failures (no response) are retried.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancellationSignal;
use crate::error::{CallError, TransportError};

/// Retry budget and backoff shape for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Every delay the policy can produce, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts.max(1)).map(|a| self.backoff(a)).collect()
    }

    /// Same shape with at most `max_attempts` attempts.
    pub fn capped(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: self.max_attempts.min(max_attempts).max(1),
            ..self.clone()
        }
    }

    /// Run `call` until it succeeds, fails deterministically, runs out of attempts
    /// or `cancel` fires.
    ///
    /// Each attempt is bounded by `timeout`; an attempt that exceeds it counts as
    /// an ambiguous [`TransportError::TimedOut`].
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        timeout: Duration,
        cancel: &CancellationSignal,
        mut call: F,
    ) -> Result<T, CallError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let outcome = cancel
                .guard(tokio::time::timeout(timeout, call(attempt)))
                .await
                .map_err(|_| CallError::Cancelled)?;

            let err = match outcome {
                Ok(Ok(value)) => {
                    debug!(call = label, attempt, "remote call succeeded");
                    return Ok(value);
                }
                Ok(Err(err)) => err,
                Err(_elapsed) => TransportError::TimedOut(timeout),
            };

            if !err.is_ambiguous() {
                return Err(CallError::from(err));
            }

            if attempt < max_attempts {
                let delay = self.backoff(attempt);
                warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "remote call failed without response, retrying"
                );
                last_error = Some(err);
                cancel.sleep(delay).await.map_err(|_| CallError::Cancelled)?;
            } else {
                last_error = Some(err);
            }
        }

        Err(CallError::Exhausted {
            attempts: max_attempts,
            last_error: last_error.unwrap_or(TransportError::TimedOut(timeout)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = fast_policy();
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn backoff_never_shrinks_with_sub_unit_multiplier() {
        let policy = RetryPolicy {
            multiplier: 0.5,
            ..fast_policy()
        };
        let delays = policy.delays();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn capped_policy_keeps_at_least_one_attempt() {
        assert_eq!(fast_policy().capped(2).max_attempts, 2);
        assert_eq!(fast_policy().capped(0).max_attempts, 1);
        assert_eq!(RetryPolicy::default().capped(10).max_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationSignal::new();

        let value = fast_policy()
            .run("probe", Duration::from_secs(1), &cancel, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TransportError::Unreachable("connection refused".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationSignal::new();

        let err = fast_policy()
            .run("probe", Duration::from_secs(1), &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TransportError::Rejected("invalid transition".into())) }
            })
            .await
            .expect_err("rejection is fatal");

        assert_eq!(err, CallError::Rejected("invalid transition".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationSignal::new();

        let err = fast_policy()
            .run("probe", Duration::from_millis(500), &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, TransportError>(())
                }
            })
            .await
            .expect_err("every attempt times out");

        assert_eq!(
            err,
            CallError::Exhausted {
                attempts: 4,
                last_error: TransportError::TimedOut(Duration::from_millis(500)),
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_further_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationSignal::new();
        let trigger = cancel.clone();

        let err = fast_policy()
            .run("probe", Duration::from_secs(1), &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                async { Err::<(), _>(TransportError::Unreachable("down".into())) }
            })
            .await
            .expect_err("cancelled");

        assert_eq!(err, CallError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
