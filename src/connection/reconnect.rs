//! Bounded fixed-delay retry policy

use std::time::Duration;

/// Retry budget for one reconnect cycle
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` retries spaced by `delay`
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            attempt: 0,
        }
    }

    /// Claim the next attempt and return the delay before it
    ///
    /// Returns `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay)
    }

    /// Start a fresh cycle
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts claimed in the current cycle
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts allowed per cycle
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
