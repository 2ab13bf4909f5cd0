//! Exponential backoff for failed fetches.

use std::time::Duration;

use rand::Rng;

/// Delay schedule after consecutive transient failures:
/// `min(base * multiplier^(n-1), cap)` plus up to `jitter` of extra delay,
/// never exceeding `cap`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    /// Fraction of the computed delay added at random, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            multiplier: 2.0,
            cap: Duration::from_secs(600),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay before retry number `failures` (1-based).
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.cap.as_secs_f64() {
            self.cap
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// [`base_delay`](Self::base_delay) with random jitter applied.
    pub fn delay(&self, failures: u32) -> Duration {
        let delay = self.base_delay(failures);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay.mul_f64(1.0 + factor).min(self.cap)
    }
}
