//! Fixed-interval retry policy for automatic reconnects.
//!
//! Deliberately not exponential: the controller retries at a constant
//! interval a bounded number of times, then stays closed until a manual
//! reconnect. Exhaustion is observable only through the attempt counter.

use std::time::Duration;

/// Bounded fixed-interval retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
    attempt: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    /// Consumes one attempt from the budget.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.interval)
    }

    /// Reset the budget, as on a successful open or a manual reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Spend the whole budget at once, suppressing further attempts.
    pub fn exhaust(&mut self) {
        self.attempt = self.max_attempts;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
