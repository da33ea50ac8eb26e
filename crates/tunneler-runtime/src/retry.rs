//! Retry backoff.
//!
//! The delay for the `n`th consecutive failure (0-indexed) is `delays[n]`,
//! clamped to the last entry of the table.

use std::time::Duration;

/// Backoff delays used after recoverable failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    /// 5s, 5s, 10s, 20s, then 60s for every further failure.
    fn default() -> Self {
        Self::from_secs(&[5, 5, 10, 20, 60])
    }
}

impl RetryPolicy {
    /// Creates a policy from a delay table.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Creates a policy from a table of whole seconds.
    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Delay after `failures` previous consecutive failures.
    ///
    /// An empty table retries immediately.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let Some(last) = self.delays.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (failures as usize).min(last);
        self.delays[index]
    }

    /// The delay table.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// Consecutive-failure counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    failures: u32,
}

impl RetryState {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Duration {
        let delay = policy.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Clears the counter after a healthy connection.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Number of consecutive failures.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
