//! Generic retry combinator for calls against the in-container server.
//!
//! Every RPC goes through [`retry`]: transient failures (connection refused
//! while the desktop is still settling, spurious 5xx from the automation
//! server) are absorbed up to a fixed attempt budget with a fixed delay
//! between attempts. Per-call timeouts are special-cased: with
//! `break_on_timeout` set, a timeout stops the loop immediately and
//! propagates unwrapped, since a slow command will not get faster by
//! re-sending it.

use std::future::Future;
use std::time::Duration;

use crate::error::SandboxError;

/// Attempt budget and pacing for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (not retries); minimum 1.
    pub attempts: u32,
    /// Delay between attempts.
    pub interval: Duration,
    /// Stop immediately when the error is timeout-classified.
    pub break_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(5),
            break_on_timeout: true,
        }
    }
}

/// Drive `f` until it succeeds or the policy's attempt budget is exhausted.
///
/// On exhaustion the last error is preserved as the cause inside
/// [`SandboxError::RetryExhausted`]. `op` names the wrapped call for logs
/// and the aggregate error.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut f: F,
) -> Result<T, SandboxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SandboxError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(op, attempt, "call succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if policy.break_on_timeout && e.is_timeout() => {
                tracing::error!(op, error = %e, "timeout occurred, not retrying");
                return Err(e);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(op, attempt, error = %e, "attempt failed, retrying");
                tokio::time::sleep(policy.interval).await;
            }
            Err(e) => {
                tracing::error!(op, attempts, "all attempts failed");
                return Err(SandboxError::RetryExhausted {
                    op: op.to_string(),
                    attempts,
                    source: Box::new(e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32, break_on_timeout: bool) -> RetryPolicy {
        RetryPolicy {
            attempts,
            interval: Duration::from_millis(0),
            break_on_timeout,
        }
    }

    #[tokio::test]
    async fn returns_success_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast_policy(10, true), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, SandboxError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_last_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast_policy(5, true), "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 5 {
                Err(SandboxError::NotStarted)
            } else {
                Ok("ready")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn exhaustion_makes_exactly_attempts_calls() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(3, true), "doomed", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SandboxError::NotStarted)
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            SandboxError::RetryExhausted { op, attempts, source } => {
                assert_eq!(op, "doomed");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, SandboxError::NotStarted));
            }
            other => panic!("expected RetryExhausted, got {other}"),
        }
    }

    #[tokio::test]
    async fn break_on_timeout_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(3, true), "slow", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SandboxError::Timeout)
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), SandboxError::Timeout));
    }

    #[tokio::test]
    async fn timeouts_are_retried_when_break_disabled() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast_policy(3, false), "slow", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(SandboxError::Timeout)
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(0, true), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SandboxError::NotStarted)
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }
}
