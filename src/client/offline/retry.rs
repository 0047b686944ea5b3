//! # Retry Ceiling
//!
//! Decides what happens to a queue item after a failed delivery attempt.
//! Items are retried in place on later drains until the ceiling is reached,
//! then dropped and reported. Nothing is retried forever.

/// Outcome of a failed delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the item; `retry_count` becomes `next_count`
    Retry { next_count: u32 },
    /// Ceiling reached; remove the item and surface the failure
    Drop { attempts: u32 },
}

/// Retry policy for queue items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one attempt
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide after a failure, given the item's `retry_count` before this attempt
    pub fn on_failure(&self, retry_count: u32) -> RetryDecision {
        let attempts = retry_count.saturating_add(1);
        if attempts >= self.max_attempts {
            RetryDecision::Drop { attempts }
        } else {
            RetryDecision::Retry { next_count: attempts }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::shared::config::DEFAULT_MAX_RETRIES)
    }
}
