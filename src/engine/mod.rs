//! Engine layer (spec.md C5-C9): stateless operations over a `Repository`
//! and a `StorageProvider`, each driving its own `ProgressTracker`.

pub mod cleanup;
pub mod compare;
pub mod dedupe;
pub mod hash;
pub mod scan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::RetryConsts;
use crate::errors::CoreError;

/// Sleep `attempt`'s exponential backoff (`base * 2^attempt`), unless
/// cancelled first (spec.md §4.5, §5). Returns `true` if it slept in full.
pub(crate) fn backoff_sleep(attempt: u32, base_ms: u64, cancelled: &AtomicBool) -> bool {
    let wait = Duration::from_millis(base_ms * 2u64.saturating_pow(attempt));
    let step = Duration::from_millis(20);
    let mut slept = Duration::ZERO;
    while slept < wait {
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }
        let chunk = step.min(wait - slept);
        std::thread::sleep(chunk);
        slept += chunk;
    }
    true
}

/// Run `f`, retrying retryable `CoreError`s with exponential backoff up to
/// `max_attempts` attempts total (spec.md §4.5, §7).
pub(crate) fn with_retry<T>(
    cancelled: &AtomicBool,
    max_attempts: u32,
    mut f: impl FnMut() -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                if !backoff_sleep(attempt, RetryConsts::BASE_BACKOFF_MS, cancelled) {
                    return Err(e);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
