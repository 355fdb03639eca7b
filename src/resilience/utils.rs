//! Backoff and jitter helpers shared by the orchestrator's retry loop.
//!
//! ```text
//!     Throttled-retry delay progression (base = 500ms, max = 30s):
//!
//!     Attempt 1: 500ms  + jitter(0..250ms)
//!     Attempt 2: 1s     + jitter(0..500ms)
//!     Attempt 3: 2s     + jitter(0..1s)
//!     Attempt 8: 30s    + jitter(0..15s)   (capped)
//! ```

use rand::Rng;
use std::time::Duration;

/// Largest exponent fed to the doubling schedule. Past this point the cap in
/// `backoff_delay` has long since taken over; bounding it keeps the shift
/// from overflowing.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Exponential delay for the given 1-based attempt number, capped at `max`.
///
/// Attempt 1 yields `base`, attempt 2 yields `2 * base`, and so on.
pub(crate) fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1u32 << exponent).min(max)
}

/// Adds uniform jitter in `[0, delay / 2]` to a backoff delay.
///
/// Randomizing the delay spreads out retries from concurrent callers that
/// were throttled at the same instant.
pub(crate) fn with_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let half = delay.as_secs_f64() / 2.0;
    let jitter = rand::thread_rng().gen_range(0.0..=half);
    delay + Duration::from_secs_f64(jitter)
}
