// ============================================================================
// Read Retry Policy
// ============================================================================
//
// Bounded exponential backoff for cache fetches. Only transient failures are
// retried (see `ApiError::is_retryable`); mutations never go through here.
//
// ============================================================================

use crate::core::{ApiError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each following one
    pub base_delay: Duration,
    /// Ceiling for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retries without waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.base_delay > self.max_delay {
            return Err("retry base_delay cannot exceed max_delay".to_string());
        }
        Ok(())
    }

    /// Run `operation` until it succeeds, fails permanently or retries run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.delay_for(attempt);
                    event!(
                        Level::WARN,
                        key = %label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying fetch"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
