//! Bounded retry with exponential backoff for transient API failures.
//!
//! Only errors that [`ProvisionerError::is_transient`] reports as transient
//! are retried. Once the attempt budget is spent the last error is folded
//! into [`ProvisionerError::Unavailable`].

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::providers::traits::ProvisionerError;

/// Retry configuration injected into the API client.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// A policy with `max_attempts` attempts and no delay between them.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// # Errors
    /// Returns the first non-transient error unchanged, or
    /// [`ProvisionerError::Unavailable`] once all attempts fail transiently.
    pub async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ProvisionerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProvisionerError>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!(
                            operation = %operation_name,
                            attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(ProvisionerError::Unavailable {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }

                    let delay = self.delay_after(attempt);
                    info!(
                        operation = %operation_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
