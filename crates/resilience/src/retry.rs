//! # Retry with Backoff
//!
//! Stateless executor for transient-failure retries. Sleeps are
//! cooperative (`tokio::time::sleep`); other work in the process
//! continues while an operation waits out its backoff.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles per attempt.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after `failed_attempts` failures:
    /// `min(base * 2^(failed_attempts - 1), max)` — 1s, 2s, 4s, ...
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Outcome of an exhausted or aborted retry loop.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed.
    #[error("operation failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The final attempt's error.
        last_error: E,
    },

    /// The error was classified non-retryable; no further attempts made.
    #[error("operation aborted after {attempts} attempts: {last_error}")]
    Aborted {
        /// Attempts made.
        attempts: u32,
        /// The non-retryable error.
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the loop ended.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } | Self::Aborted { last_error, .. } => last_error,
        }
    }

    /// Attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Invoke `operation` up to the policy's attempt budget, sleeping the
/// backoff between attempts. The closure receives the 1-based attempt
/// number.
///
/// The handler only reports exhaustion; escalation (circuit breaker,
/// dead-lettering) belongs to the caller.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_if(policy, operation, |_| true).await
}

/// Like [`retry_with_backoff`], but stops early when `is_retryable`
/// classifies an error as pointless to retry (e.g. an open circuit).
pub async fn retry_with_backoff_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) if attempt >= policy.max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
