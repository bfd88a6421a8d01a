//! Delivery identity, outcomes, and dead letters.

use crate::task::domain::{StatusChangeEvent, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of one queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Creates a new random delivery identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a delivery identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal failure of an event that used up its delivery attempts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("delivery {delivery_id} for task {task_id} failed after {attempts} attempts: {last_error}")]
pub struct ExhaustedRetryError {
    /// Delivery that failed.
    pub delivery_id: DeliveryId,
    /// Task the event targeted.
    pub task_id: TaskId,
    /// Attempts made.
    pub attempts: u32,
    /// Failure reported by the last attempt.
    pub last_error: String,
}

/// Event parked after exhausting its attempts. Never redelivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// The event that could not be applied.
    pub event: StatusChangeEvent,
    /// Why it was abandoned.
    pub error: ExhaustedRetryError,
}

/// What the queue did with a failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The event will be redelivered after `after`.
    Retry {
        /// Attempt that failed.
        attempt: u32,
        /// Delay before the next delivery.
        after: Duration,
    },
    /// The event was moved to the dead letters.
    DeadLettered(ExhaustedRetryError),
}

/// Point-in-time delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Events waiting for their first or next delivery.
    pub queued: u64,
    /// Events currently leased by a worker.
    pub in_flight: u64,
    /// Events waiting out a retry backoff.
    pub retry_scheduled: u64,
    /// Events that exhausted their attempts.
    pub dead: u64,
}

impl QueueCounts {
    /// Returns the number of events not yet acknowledged or dead.
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.queued + self.in_flight + self.retry_scheduled
    }
}
