//! Exponential backoff between reconnect attempts

use std::time::Duration;

/// Doubling delay with a ceiling
///
/// After `k` consecutive failures the delay is `min(floor * 2^k, ceiling)`.
/// A success resets it to `floor`.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current()
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Delay for the current failure count
    pub fn current(&self) -> Duration {
        // 2^31 already exceeds any sane ceiling; clamp the shift
        let factor = 1u32 << self.failures.min(31);
        self.floor
            .checked_mul(factor)
            .map_or(self.ceiling, |delay| delay.min(self.ceiling))
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
