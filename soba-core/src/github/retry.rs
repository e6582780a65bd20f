//! Retry middleware for GitHub calls.
//!
//! Connection failures and 5xx/429 responses retry with exponential
//! backoff: base 0.5s, factor 2, max 3 attempts, ±50% jitter. Rate-limit
//! exhaustion is classified separately and never retried here; the control
//! loop sleeps until the reset time instead.

use std::time::Duration;

use tracing::debug;

use crate::error::Result;

const MAX_ATTEMPTS: u32 = 3;
const BASE_MILLIS: u64 = 500;

pub fn with_retry<T>(op: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                debug!(op, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Backoff for the given attempt (1-based): `base * 2^(attempt-1)`,
/// jittered to anywhere in [50%, 150%] of that value.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_MILLIS.saturating_mul(1u64 << (attempt - 1));
    let jittered = base / 2 + random_below(base).unwrap_or(base / 2);
    Duration::from_millis(jittered)
}

/// Uniform-ish random value in [0, bound) from OS entropy. None when the
/// entropy source is unavailable; callers fall back to the midpoint.
fn random_below(bound: u64) -> Option<u64> {
    if bound == 0 {
        return Some(0);
    }
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf).ok()?;
    Some(u64::from_le_bytes(buf) % (bound + 1))
}
