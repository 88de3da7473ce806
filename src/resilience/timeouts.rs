//! Deadline enforcement for backend calls.
//!
//! A call is bounded by its service timeout and, when the caller has one, by
//! the caller's own deadline, whichever comes first.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::GatewayError;

/// Earliest of `now + timeout` and the caller's deadline.
pub fn effective_deadline(timeout: Duration, caller: Option<Instant>) -> Instant {
    let own = Instant::now() + timeout;
    match caller {
        Some(deadline) if deadline < own => deadline,
        _ => own,
    }
}

/// Run `fut` until `deadline`, mapping expiry to [`GatewayError::Timeout`].
pub async fn with_deadline<T, F>(service: &str, deadline: Instant, fut: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let started = Instant::now();
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            let after = started.elapsed();
            tracing::error!(service, after_ms = after.as_millis() as u64, "backend call timed out");
            Err(GatewayError::Timeout {
                service: service.to_string(),
                after,
            })
        }
    }
}
