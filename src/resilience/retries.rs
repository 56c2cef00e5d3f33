//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt (or an unusable result) is retryable
//! - Wait between attempts using the configured backoff
//! - Stop after the configured number of attempts
//!
//! # Design Decisions
//! - Attempt count includes the first call
//! - Once attempts run out the last error is returned as-is, never wrapped
//! - Result-based retry (empty list) returns the last result when exhausted

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ApiError, ApiResult};
use crate::resilience::backoff::retry_delay;

/// Results that may ask for another attempt even though the call succeeded.
pub trait RetryOnResult {
    fn is_retryable_result(&self) -> bool {
        false
    }
}

impl<T> RetryOnResult for Vec<T> {
    fn is_retryable_result(&self) -> bool {
        self.is_empty()
    }
}

impl RetryOnResult for bool {}

impl RetryOnResult for () {}

/// Bounded retry with a wait between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    retry_on: fn(&ApiError) -> bool,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, retry_on: ApiError::is_retryable }
    }

    /// Replace the error predicate.
    pub fn retry_on(mut self, predicate: fn(&ApiError) -> bool) -> Self {
        self.retry_on = predicate;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Wait after failed attempt number `attempt`.
    pub fn wait_after(&self, attempt: u32) -> Duration {
        retry_delay(&self.config, attempt)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut call: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
        T: RetryOnResult,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = call().await;
            let exhausted = attempt >= max_attempts;

            match result {
                Ok(value)
                    if !exhausted
                        && self.config.retry_on_empty_result
                        && value.is_retryable_result() =>
                {
                    let delay = self.wait_after(attempt);
                    tracing::warn!(endpoint, attempt, delay = ?delay, "Retrying after empty result");
                    tokio::time::sleep(delay).await;
                }
                Ok(value) => return Ok(value),
                Err(e) if !exhausted && (self.retry_on)(&e) => {
                    let delay = self.wait_after(attempt);
                    tracing::warn!(endpoint, attempt, delay = ?delay, error = %e, "Retrying after failure");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if exhausted && max_attempts > 1 {
                        tracing::debug!(endpoint, attempts = attempt, "Retry attempts exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
