//! Retry with exponential backoff for adapter-level HTTP calls.
//!
//! Transient failures (5xx, 429, connection errors, rate limits) are
//! retried here and never reach the reconciliation engine unless the
//! attempts are exhausted.

use crate::error::{MigrationError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
    /// Longest wait honoured for a rate-limit reset.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            max_rate_limit_wait: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits; for tests against mock servers.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            max_rate_limit_wait: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_delay_ms * self.multiplier.powi(attempt as i32 - 1);
        let capped_delay =
            Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64);

        if self.jitter {
            // Add up to 25% jitter
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            Duration::from_millis((capped_delay.as_millis() as f64 * jitter_factor) as u64)
        } else {
            capped_delay
        }
    }

    fn delay_for_error(&self, attempt: u32, error: &MigrationError) -> Duration {
        match error {
            MigrationError::RateLimitExceeded(secs) => {
                Duration::from_secs(*secs).min(self.max_rate_limit_wait)
            }
            _ => self.delay_for_attempt(attempt),
        }
    }

    /// Execute an operation, retrying transient failures.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_when(MigrationError::is_transient, operation).await
    }

    /// Execute an operation, retrying only errors accepted by `retryable`.
    pub async fn execute_when<P, F, Fut, T>(&self, retryable: P, mut operation: F) -> Result<T>
    where
        P: Fn(&MigrationError) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if retryable(&e) && attempt < self.max_attempts => {
                    let delay = self.delay_for_error(attempt, &e);
                    tracing::debug!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if retryable(&e) {
                        tracing::warn!(
                            attempt = attempt,
                            max_attempts = self.max_attempts,
                            error = %e,
                            "Retry exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
