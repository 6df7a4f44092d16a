//! Bounded retry with exponential backoff and jitter.
//!
//! Sink adapters wrap each individual write in [`retry_with_backoff`] so a
//! transient failure of one destination is absorbed locally instead of
//! leaking back into the controller.
//!
//! # Example
//!
//! ```ignore
//! use k8swatch::retry::{retry_with_backoff, RetryConfig, RetryError};
//!
//! retry_with_backoff(&RetryConfig::default(), "index event", || async {
//!     client.post(url).send().await.map_err(RetryError::Transient)
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total number of invocations, including the first (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Override the initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Failure reported by a single attempt.
///
/// `Permanent` stops the retry loop immediately; the wrapped error is
/// returned to the caller as-is.
#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// Worth trying again after a delay
    Transient(E),
    /// Retrying cannot help (bad request, missing config, ...)
    Permanent(E),
}

impl<E> RetryError<E> {
    /// Unwrap the underlying error
    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Runs `operation` at most `config.max_attempts` times. After each
/// transient failure the loop sleeps for the current delay plus a random
/// jitter in `[0, delay]`, then doubles the delay (capped at `max_delay`).
///
/// # Returns
/// The operation's value, or the last error once attempts are exhausted or
/// a [`RetryError::Permanent`] is seen.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(RetryError::Permanent(e)) => {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed with non-retryable error"
                );
                return Err(e);
            }
            Err(RetryError::Transient(e)) => e,
        };

        if attempt >= max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        let jittered_delay = with_jitter(delay);
        warn!(
            operation = %operation_name,
            attempt = attempt,
            remaining = max_attempts - attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::time::sleep(jittered_delay).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}

/// `delay` plus a uniformly random extra in `[0, delay]`
fn with_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    delay + Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
