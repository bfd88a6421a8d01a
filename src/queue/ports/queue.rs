//! Queue port for at-least-once delivery of status-change events.

use crate::queue::domain::{DeadLetter, DeliveryId, FailureDisposition, QueueCounts};
use crate::task::domain::StatusChangeEvent;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Durable channel of status-change events with competing consumers.
///
/// Each event is delivered until a consumer acknowledges it or its attempts
/// run out, at which point it becomes a [`DeadLetter`].
#[async_trait]
pub trait StatusChangeQueue: Send + Sync {
    /// Returns the channel name.
    fn name(&self) -> &str;

    /// Adds an event without waiting for it to be consumed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transient`] when the event could not be stored
    /// or [`QueueError::Closed`] when the queue no longer accepts events.
    async fn enqueue(&self, event: StatusChangeEvent) -> QueueResult<DeliveryId>;

    /// Leases the next deliverable event without waiting.
    ///
    /// Not cancellation safe: a lease taken by a dropped call still spends
    /// an attempt. Race [`Self::wait_for_ready`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transient`] when the backing store fails.
    async fn try_lease(&self) -> QueueResult<LeaseAttempt>;

    /// Returns once [`Self::try_lease`] may find an event or the queue has
    /// closed. Wakes may be spurious. Cancellation safe.
    async fn wait_for_ready(&self);

    /// Waits for the next deliverable event and leases it to the caller.
    ///
    /// Returns `None` once the queue is closed and drained.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transient`] when the backing store fails.
    async fn lease(&self) -> QueueResult<Option<Box<dyn StatusChangeDelivery>>> {
        loop {
            match self.try_lease().await? {
                LeaseAttempt::Leased(delivery) => return Ok(Some(delivery)),
                LeaseAttempt::Closed => return Ok(None),
                LeaseAttempt::Empty => self.wait_for_ready().await,
            }
        }
    }

    /// Returns current delivery counts.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transient`] when the backing store fails.
    async fn counts(&self) -> QueueResult<QueueCounts>;

    /// Returns every event that exhausted its attempts.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transient`] when the backing store fails.
    async fn dead_letters(&self) -> QueueResult<Vec<DeadLetter>>;
}

/// Result of one [`StatusChangeQueue::try_lease`] call.
pub enum LeaseAttempt {
    /// An event is now held by the caller.
    Leased(Box<dyn StatusChangeDelivery>),
    /// Nothing is deliverable yet.
    Empty,
    /// The queue is closed and drained.
    Closed,
}

/// A leased event. Settle it with exactly one of [`Self::ack`] or
/// [`Self::fail`].
#[async_trait]
pub trait StatusChangeDelivery: Send + Sync {
    /// Returns the delivery identifier.
    fn id(&self) -> DeliveryId;

    /// Returns the leased event.
    fn event(&self) -> &StatusChangeEvent;

    /// Returns which attempt this lease is, starting at 1.
    fn attempt(&self) -> u32;

    /// Removes the event from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LeaseLost`] when the lease expired and the
    /// event was handed elsewhere.
    async fn ack(self: Box<Self>) -> QueueResult<()>;

    /// Reports a failed attempt. The queue schedules a retry or, when the
    /// attempts are used up, dead-letters the event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LeaseLost`] when the lease expired and the
    /// event was handed elsewhere.
    async fn fail(self: Box<Self>, reason: String) -> QueueResult<FailureDisposition>;
}

/// Errors returned by queue implementations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The backing store failed; the operation may be retried.
    #[error("transient queue failure: {0}")]
    Transient(Arc<dyn std::error::Error + Send + Sync>),

    /// The lease is no longer held by the caller.
    #[error("lease lost for delivery {0}")]
    LeaseLost(DeliveryId),

    /// The queue has been closed.
    #[error("queue is closed")]
    Closed,
}

impl QueueError {
    /// Wraps a backing-store error.
    pub fn transient(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transient(Arc::new(err))
    }
}
