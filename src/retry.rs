//! Bounded retry with exponential backoff and jitter
//!
//! Wraps a single provider call. Cross-provider fallback is the router's
//! job; this policy never talks to more than one provider.

use crate::config::RetryConfig;
use crate::types::{Result, RouterError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy value object, cheap to clone
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from config
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute a call with bounded retry
    ///
    /// Retryable failures (transport, timeout, rate limit) are re-attempted
    /// up to `max_attempts` total invocations, sleeping an exponentially
    /// growing delay between attempts. Non-retryable failures propagate
    /// immediately without consuming further attempts. Only the current
    /// task suspends during backoff.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    debug!(error = %err, "non-retryable error, propagating");
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %err, "retry attempts exhausted");
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt - 1);
                    debug!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Backoff delay for a 0-indexed failed attempt
    ///
    /// `min(max_delay, base_delay * exponential_base^attempt)`, then scaled
    /// by a uniform factor in `[0.5, 1.0]` when jitter is enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp =
            self.config.base_delay.as_secs_f64() * self.config.exponential_base.powi(attempt as i32);
        let mut secs = exp.min(self.config.max_delay.as_secs_f64());
        if self.config.jitter {
            secs *= rand::thread_rng().gen_range(0.5..=1.0);
        }
        Duration::from_secs_f64(secs)
    }
}
