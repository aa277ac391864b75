//! Exponential backoff for jobs that hit a system fault.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

/// When to run a job again after its `attempt`-th failure (1-indexed).
///
/// `delay = min(base * 2^(attempt - 1), max) * (1 ± jitter)`
pub fn next_retry_time(
    now: DateTime<Utc>,
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    jitter_factor: f64,
) -> DateTime<Utc> {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_secs
    } else {
        base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(max_delay_secs)
    };

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let range = (delay as f64) * jitter_factor.clamp(0.0, 1.0);
        let jitter: f64 = rand::rng().random_range(-range..=range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    now.checked_add_signed(secs(jittered))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds as a `TimeDelta`, saturating instead of panicking.
pub(crate) fn secs(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
