//! Reconnect delays

use std::time::Duration;

use discobra_common::ReconnectConfig;
use rand::Rng;

/// Exponential backoff for `attempt` (1-based): `base * 2^(attempt-1)`, capped at `max`
#[must_use]
pub fn compute_backoff(config: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    config
        .base_delay
        .saturating_mul(1u32 << exponent)
        .min(config.max_delay)
}

/// Add up to 25% random jitter so many clients do not reconnect in lockstep
#[must_use]
pub fn with_jitter(delay: Duration) -> Duration {
    let max_jitter = delay / 4;
    if max_jitter.is_zero() {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..=max_jitter);
    delay + jitter
}

/// Wait before re-identifying after an Invalid Session: 1 to 5 seconds
#[must_use]
pub fn invalid_session_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(1_000..=5_000))
}
