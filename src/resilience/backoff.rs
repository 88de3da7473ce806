//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to wait before attempt number `attempt + 1`.
///
/// `attempt` counts failed attempts so far; zero means no wait. The delay
/// starts at `initial`, grows by `multiplier` per attempt, is capped at `max`,
/// and gets up to 10% of jitter on top.
pub fn calculate_backoff(attempt: u32, initial: Duration, max: Duration, multiplier: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
    let delay_ms = (initial.as_millis() as f64 * factor).min(max.as_millis() as f64) as u64;

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}
