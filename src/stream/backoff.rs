use std::time::Duration;

/// Exponential reconnect policy: `min(initial * 2^attempt, max)`, giving up
/// after `max_attempts` consecutive failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay for a given attempt number, independent of current state
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Register a failure. Returns the delay before the next attempt, or
    /// `None` once the attempt budget is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt >= self.max_attempts {
            None
        } else {
            Some(delay)
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
