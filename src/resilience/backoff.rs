//! Wait calculation between retry attempts.

use std::time::Duration;
use rand::Rng;

use crate::config::RetryConfig;

/// Calculate the wait before retry number `retry` (1 = after the first attempt).
///
/// A multiplier of 1.0 gives a fixed wait. Larger multipliers grow the wait
/// geometrically up to `max_ms`.
pub fn calculate_backoff(retry: u32, base_ms: u64, multiplier: f64, max_ms: u64) -> Duration {
    if retry == 0 {
        return Duration::from_millis(0);
    }

    let factor = multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
    let delay_ms = (base_ms as f64 * factor).min(max_ms.max(base_ms) as f64);

    Duration::from_millis(delay_ms as u64)
}

/// Add 0 to 10% random jitter to a delay.
pub fn with_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}

/// Wait before retry number `retry` according to the retry configuration.
pub fn retry_delay(config: &RetryConfig, retry: u32) -> Duration {
    let delay = calculate_backoff(retry, config.wait_ms, config.multiplier, config.max_wait_ms);
    if config.jitter {
        with_jitter(delay)
    } else {
        delay
    }
}
