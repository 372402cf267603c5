//! Bounded retry with exponential backoff
//!
//! Only transient failures are retried. `max_retries` counts total attempts,
//! so with the default of 3 a page is tried at most three times and waits
//! through at most two backoffs. Backoff is independent of the politeness
//! delay between batches.

use crate::config::CrawlerConfig;
use crate::crawler::FetchError;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Outcome of a retried operation and how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, FetchError>,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    /// Backoff waits taken before the final attempt
    pub fn backoffs(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// A `max_retries` of zero is treated as a single attempt
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait after the given failed attempt (1-based)
    ///
    /// Doubles from the base delay per attempt, is raised to a server's
    /// `Retry-After` when one was sent, and never exceeds the maximum delay.
    pub fn backoff_for(&self, attempt: u32, error: &FetchError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let backoff = match error.retry_after() {
            Some(requested) => backoff.max(requested),
            None => backoff,
        };
        backoff.min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// # Arguments
    ///
    /// * `label` - What is being attempted, for log lines
    /// * `op` - Produces a fresh future per attempt
    ///
    /// # Returns
    ///
    /// The final result with the attempt count. A transient failure on the
    /// last attempt is reported as [`FetchError::Exhausted`], which is
    /// permanent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match op().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                return Attempted {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            if attempt >= self.max_retries {
                tracing::warn!(
                    "All {} attempts exhausted for {}: {}",
                    self.max_retries,
                    label,
                    error
                );
                return Attempted {
                    result: Err(FetchError::Exhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    }),
                    attempts: attempt,
                };
            }

            let backoff = self.backoff_for(attempt, &error);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempt,
                self.max_retries,
                label,
                error,
                backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}
