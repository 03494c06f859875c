use std::ops::Range;
use std::time::Duration;

/// Fetch attempts per transfer.
pub const MAX_RETRIES: u32 = 5;

/// Backoff unit; the wait before attempt `n` is `n * INITIAL_RETRY_DELAY`.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            initial_delay: INITIAL_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Zero-based attempt indices. Always at least one attempt.
    pub fn attempts(&self) -> Range<u32> {
        0..self.max_attempts.max(1)
    }

    /// Wait before attempt `attempt` (zero-based): 0, 1x, 2x, 3x, ...
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(attempt)
    }

    /// Sum of every wait if all attempts are used.
    pub fn total_backoff(&self) -> Duration {
        self.attempts()
            .map(|attempt| self.delay_before(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
