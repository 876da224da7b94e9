//! Pause between downstream attempts.
//!
//! The pause doubles after every failed attempt of an exchange and stops
//! growing at `retries.max_delay_ms`. Up to a tenth more is added at random.

use std::time::Duration;

use rand::Rng;

/// Pause after failed attempt number `attempt` (1-based) before the next one.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let Some(doublings) = attempt.checked_sub(1) else {
        return Duration::ZERO;
    };

    let pause_ms = 2u64
        .checked_pow(doublings)
        .and_then(|factor| base_ms.checked_mul(factor))
        .map_or(max_ms, |ms| ms.min(max_ms));

    let spread_ms = pause_ms / 10;
    let extra_ms = match spread_ms {
        0 => 0,
        spread => rand::thread_rng().gen_range(0..spread),
    };

    Duration::from_millis(pause_ms + extra_ms)
}
