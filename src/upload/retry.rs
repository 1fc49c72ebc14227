//! Bounded retry with exponential backoff.
//!
//! A delivery is attempted up to `max_attempts` times. Between attempts the
//! executor sleeps for `initial_delay * backoff_multiplier^(n-1)`, capped at
//! `max_delay`, optionally scaled by a random factor in `[0.5, 1]` so that
//! retries already at the cap still spread out. The summed sleep for one
//! delivery never exceeds `max_elapsed`; when the next delay would cross that
//! budget the executor gives up early with the last failure.

use crate::config::types::RetryConfig;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Classifies failures as worth another attempt or not.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// The last failure after the executor stopped retrying.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetriesExhausted<E: std::error::Error + 'static> {
    pub attempts: u32,
    #[source]
    pub last: E,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
    max_elapsed: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier.max(1.0),
            jitter: config.jitter,
            max_elapsed: config.max_elapsed,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay before attempt `failed_attempts + 1`, without jitter.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Summed un-jittered backoff across all retries, the longest a delivery
    /// can spend sleeping. Jitter only ever shortens a delay.
    pub fn total_backoff(&self) -> Duration {
        let mut total = Duration::ZERO;
        for n in 1..self.max_attempts {
            let delay = self.backoff(n);
            if delay == self.backoff(n + 1) {
                // Flat from here on
                let remaining = self.max_attempts - n;
                return total.saturating_add(delay.saturating_mul(remaining));
            }
            total = total.saturating_add(delay);
        }
        total
    }

    fn delay_for(&self, failed_attempts: u32) -> Duration {
        let base = self.backoff(failed_attempts);
        if self.jitter {
            add_jitter(base)
        } else {
            base
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt or time budget runs out.
    ///
    /// `operation` receives the 1-based attempt number. On success the number
    /// of attempts used is returned.
    pub async fn execute<F, Fut, E>(&self, mut operation: F) -> Result<u32, RetriesExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: IsRetryable + Display + std::error::Error + 'static,
    {
        let mut attempt = 0;
        let mut slept = Duration::ZERO;

        loop {
            attempt += 1;
            let error = match operation(attempt).await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Delivery succeeded after retry");
                    }
                    return Ok(attempt);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::warn!(error = %error, attempt, "Not retrying non-retryable failure");
                return Err(RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            if attempt >= self.max_attempts {
                return Err(RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_for(attempt);
            if slept + delay > self.max_elapsed {
                tracing::warn!(
                    attempts = attempt,
                    retry_budget_ms = self.max_elapsed.as_millis() as u64,
                    "Retry time budget exhausted"
                );
                return Err(RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            tracing::warn!(
                error = %error,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Delivery failed, retrying"
            );

            tokio::time::sleep(delay).await;
            slept += delay;
        }
    }
}

/// Scale a delay by a uniform factor in `[0.5, 1]`.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
    delay.mul_f64(factor)
}
