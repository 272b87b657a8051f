//! Backoff and retry-eligibility arithmetic for the sync queue.
//!
//! Pure calculation, no shared state. The queue processor consults this
//! policy to decide whether a failed entry stays PENDING or becomes
//! terminally FAILED; the delay values are advisory metadata for the
//! scheduler that drives drain cadence, nothing here sleeps.

/// Retry policy constants for queued sync operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of failed attempts before an entry is abandoned.
    pub max_retries: u32,
    /// Delay for the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling on the exponential backoff, in milliseconds.
    pub max_delay_ms: u64,
}

/// Composed retry decision for a queue entry with a known failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    /// Whether another attempt should be made.
    pub should_retry: bool,
    /// Advisory delay before the next attempt, in milliseconds.
    pub next_delay_ms: u64,
    /// Attempts remaining before the entry becomes terminal.
    pub retries_remaining: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for a given attempt number.
    ///
    /// Attempt 0 is the initial try and carries no delay. Attempt `n >= 1`
    /// waits `base * 2^(n-1)` milliseconds, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX));
        exponential.min(self.max_delay_ms)
    }

    /// Whether an entry that has already failed `retry_count` times is
    /// still eligible for another attempt.
    pub fn is_retry_eligible(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Compose eligibility and backoff into a single decision.
    ///
    /// `next_delay_ms` is computed for attempt `retry_count + 1`, the
    /// attempt the caller would schedule next.
    pub fn plan(&self, retry_count: u32) -> RetryPlan {
        RetryPlan {
            should_retry: self.is_retry_eligible(retry_count),
            next_delay_ms: self.delay_for_attempt(retry_count + 1),
            retries_remaining: self.max_retries.saturating_sub(retry_count),
        }
    }
}
