//! Exponential-backoff retry for single remote calls.
//!
//! A call failing with a retryable [`ApiError`] is repeated after
//! `backoff_factor * 2^attempt`; any other failure is returned at once.

use std::future::Future;
use std::time::Duration;

use casebridge_core::error::ApiError;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default backoff unit.
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay unit multiplied by `2^attempt`.
    pub backoff_factor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1` (`attempt` counts from 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_factor.saturating_mul(factor)
    }
}

/// Runs remote calls under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingCaller {
    name: &'static str,
    policy: RetryPolicy,
}

impl RetryingCaller {
    /// * `name` - Remote system label used in log fields.
    pub fn new(name: &'static str, policy: RetryPolicy) -> Self {
        Self { name, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `call` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// * `operation` - Short description for log output, e.g. `"get_cases"`.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(
                        remote = self.name,
                        operation,
                        error = %e,
                        "Request failed with a non-retryable error",
                    );
                    return Err(e);
                }
                Err(e) if attempt >= self.policy.max_retries => {
                    tracing::error!(
                        remote = self.name,
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Request failed after all retries",
                    );
                    return Err(ApiError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        remote = self.name,
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
