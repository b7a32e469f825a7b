//! Task-level retry policy: whether a failed attempt gets re-queued, and
//! how long to sleep before it does.

use std::time::Duration;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay_ms: u32) -> Self {
        RetryPolicy {
            max_retries,
            retry_delay_ms,
        }
    }

    /// `Cancelled` always short-circuits to terminal and skips retry policy
    /// entirely; every other kind may retry while `retry_count < max_retries`.
    pub fn should_retry(&self, retry_count: u32, error: &EngineError) -> bool {
        !error.is_cancelled() && retry_count < self.max_retries
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms as u64)
    }
}
