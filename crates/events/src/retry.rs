//! Retry policies and the cancellable retry loop used at startup.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How many times to try, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (`None` = retry forever)
    pub max_attempts: Option<u32>,
    /// Pause after each failed attempt
    pub delay: Duration,
}

impl RetryPolicy {
    /// Bounded number of attempts with a fixed delay between them.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay,
        }
    }

    /// Unbounded attempts with a fixed delay between them.
    pub fn forever(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts have failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

/// Why [`retry`] gave up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Run `attempt_fn` until it succeeds, the policy is exhausted, or `cancel` fires.
///
/// The closure receives the 1-indexed attempt number. Waiting between attempts is
/// a timer raced against the token, so a shutdown never has to sit out a backoff.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: core::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }

        attempt += 1;
        let err = match attempt_fn(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !policy.should_retry(attempt) {
            warn!(operation, attempt, error = %err, "giving up; retry budget exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: err,
            });
        }

        let delay = policy.delay;
        warn!(
            operation,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "attempt failed; retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
