//! Delivery attempts and exponential backoff.

use std::time::Duration;

/// Name of the channel carrying status-change events.
pub const TASK_PROCESSING_QUEUE: &str = "task-processing";

/// Retry policy applied to every delivery on a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
}

impl DeliveryPolicy {
    /// Attempts per event when nothing else is configured.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// Delay before the first retry when nothing else is configured.
    pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

    /// Creates a doubling backoff policy.
    ///
    /// `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: 2,
        }
    }

    /// Returns the number of deliveries attempted before an event is dead.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns whether a delivery that failed on `attempt` has used up its
    /// budget.
    #[must_use]
    pub const fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Returns the delay before redelivering an event whose `attempt`-th
    /// delivery failed: `initial * multiplier^(attempt - 1)`.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::exponential(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INITIAL_BACKOFF)
    }
}
