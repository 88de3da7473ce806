//! Retry logic for backend calls.
//!
//! # Design Decisions
//! - Only `Unavailable`, `ResourceExhausted` and `DeadlineExceeded` are
//!   retried; every other status is returned as-is
//! - The attempt count includes the first call
//! - The caller bounds the whole loop with its deadline, so backoff sleeps
//!   are cut short by the timeout rather than checked here

use std::future::Future;
use std::time::Duration;

use tonic::{Code, Status};

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Retry policy declared per channel and applied per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable(code: Code) -> bool {
        matches!(
            code,
            Code::Unavailable | Code::ResourceExhausted | Code::DeadlineExceeded
        )
    }

    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        calculate_backoff(
            failed_attempts,
            self.initial_backoff,
            self.max_backoff,
            self.multiplier,
        )
    }
}

/// Run `call` until it succeeds, fails with a non-retryable status, or the
/// attempt budget is spent. The last status is returned on exhaustion.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(status) => {
                if !RetryPolicy::is_retryable(status.code()) || attempt >= policy.max_attempts {
                    return Err(status);
                }
                let delay = policy.backoff(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    code = ?status.code(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying backend call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
