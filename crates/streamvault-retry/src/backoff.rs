//! Exponential backoff with jitter.

use std::time::Duration;

const MAX_DELAY: Duration = Duration::from_secs(60);

/// `baseDelay × 2^attempt × (1 + jitter)`, capped at 60s.
///
/// `attempt` is 0-based (the delay before the *first* retry uses
/// `attempt = 0`). `jitter` must already be in `[0.0, 0.25]`; callers draw it
/// from an RNG so this function stays a pure, testable computation.
pub fn exponential_with_jitter(base_delay: Duration, attempt: u32, jitter: f64) -> Duration {
    debug_assert!((0.0..=0.25).contains(&jitter));
    let multiplier = 2f64.powi(attempt as i32) * (1.0 + jitter);
    let scaled = base_delay.mul_f64(multiplier);
    scaled.min(MAX_DELAY)
}

/// Draws a jitter fraction in `[0.0, 0.25]`.
pub fn random_jitter() -> f64 {
    rand::random::<f64>() * 0.25
}
