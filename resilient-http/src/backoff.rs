//! Exponential backoff calculation.

use std::time::Duration;

use rand::Rng;

/// Fraction of the computed delay used as the jitter range in each direction.
pub const JITTER_FRACTION: f64 = 0.25;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound before jitter
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Spread the delay by ±25%
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retrying after the given zero-indexed attempt.
    ///
    /// `min(base * multiplier^attempt, max)`, then widened by a uniform
    /// factor in `[0.75, 1.25]` when jitter is on.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw_nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        let capped_nanos = raw_nanos.min(self.max_delay.as_nanos() as f64);

        let final_nanos = if self.jitter {
            let factor = rand::thread_rng().gen_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
            capped_nanos * factor
        } else {
            capped_nanos
        };

        Duration::from_nanos(final_nanos.max(0.0) as u64)
    }
}
