use std::time::Duration;

use crate::config::TranscriptionConfig;
use super::TranscriptionFault;

/// Exponential backoff for transient transcription failures.
///
/// Only rate limiting and network failures are retried. An oversized payload
/// is never retried and never triggers a re-split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Fail on the first error
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based), or `None` to give up
    pub fn backoff(&self, fault: &TranscriptionFault, attempt: u32) -> Option<Duration> {
        if !fault.cause.is_transient() || attempt >= self.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.min(16));
        Some(self.base_delay.saturating_mul(factor))
    }
}
