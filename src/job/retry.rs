//! Bounded retry with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{ChatError, SubmitError};

/// Errors that may be worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// An explicit retry budget. Attempts are spaced by exponential backoff
/// with a hard cap and a little jitter to avoid thundering herds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget runs out. The closure receives the 1-based
    /// attempt number; the last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delay after the given failed 1-based attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        let doublings = (attempt - 1).min(16);
        let raw = self.base_delay.saturating_mul(1u32 << doublings);
        let capped = raw.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        capped.mul_f64(1.0 + jitter)
    }
}

/// HTTP statuses treated as transient: throttling and server-side faults.
pub(crate) fn retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

impl Retryable for SubmitError {
    fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Network(_) => true,
            SubmitError::Rejected { status, .. } => retryable_status(*status),
            SubmitError::Decode(_) => false,
        }
    }
}

impl Retryable for ChatError {
    fn is_retryable(&self) -> bool {
        match self {
            ChatError::RateLimited { .. } => true,
            ChatError::Gateway { status, .. } => retryable_status(*status),
            ChatError::Request(_) => true,
            ChatError::Stream(_) | ChatError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn network(msg: &str) -> SubmitError {
        SubmitError::Network(msg.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5);

        let counter = calls.clone();
        let result: Result<&str, SubmitError> = policy
            .run(|_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(network("connection reset"))
                    } else {
                        Ok("accepted")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "accepted");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5);

        let counter = calls.clone();
        let result: Result<(), SubmitError> = policy
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SubmitError::Rejected {
                        status: 400,
                        message: "bad sql".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3);

        let counter = calls.clone();
        let result: Result<(), SubmitError> = policy
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(network("gateway unreachable"))
                }
            })
            .await;

        match result {
            Err(SubmitError::Network(msg)) => assert_eq!(msg, "gateway unreachable"),
            other => panic!("expected network error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_numbers_are_one_based() {
        let policy = RetryPolicy::new(3);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let log = seen.clone();
        let _: Result<(), SubmitError> = policy
            .run(|attempt| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(attempt);
                    Err(network("down"))
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn transient_status_classification() {
        assert!(retryable_status(429));
        assert!(retryable_status(500));
        assert!(retryable_status(503));
        assert!(!retryable_status(200));
        assert!(!retryable_status(400));
        assert!(!retryable_status(404));
    }

    #[test]
    fn submit_error_classification() {
        assert!(network("timeout").is_retryable());
        assert!(
            SubmitError::Rejected {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            !SubmitError::Rejected {
                status: 422,
                message: "invalid".to_string()
            }
            .is_retryable()
        );
        assert!(!SubmitError::Decode("not json".to_string()).is_retryable());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        // Far past the doubling range the delay stays at the cap plus
        // at most 25% jitter.
        let delay = policy.backoff(9);
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_millis(2500));
    }
}
