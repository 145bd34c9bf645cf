//! Exponential backoff for upstream transport failures

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::GeminiConfig;

/// Retry budget: `max_retries` extra attempts, delay doubling from `initial_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    pub fn from_config(config: &GeminiConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_delay_ms),
        )
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay
            .checked_mul(2u32.saturating_pow(retry))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Why the retry loop gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed
    Exhausted { retries: u32, last: E },
    /// Shutdown interrupted a backoff wait
    Cancelled { attempts: u32, last: E },
}

/// Run `operation` until it succeeds, the retry budget is spent, or `cancel`
/// fires during a backoff wait.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut remaining = policy.max_retries;
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if remaining == 0 {
            return Err(RetryError::Exhausted {
                retries: policy.max_retries,
                last: error,
            });
        }

        warn!(
            attempt,
            retries_left = remaining,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Request failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled { attempts: attempt, last: error });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        remaining -= 1;
        attempt += 1;
        delay = delay.saturating_mul(2);
    }
}
