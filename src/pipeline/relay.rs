//! Outbox relay: publishes committed status-change announcements.

use crate::queue::ports::{QueueError, StatusChangeQueue};
use crate::task::ports::{TaskStore, TaskStoreError};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by one relay pass.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Reading or marking the outbox failed.
    #[error("outbox access failed: {0}")]
    Store(#[from] TaskStoreError),
    /// The queue refused an entry. Entries enqueued before the failure were
    /// still marked published.
    #[error("enqueue failed after {published} entries: {source}")]
    Queue {
        /// Entries published before the failure.
        published: usize,
        /// Underlying queue error.
        source: QueueError,
    },
}

/// Moves pending outbox entries onto the status-change queue.
///
/// Entries are marked published only after the queue accepted them, so a
/// crash between the two steps republishes them. Workers tolerate the
/// duplicates.
pub struct OutboxRelay<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    queue: Arc<dyn StatusChangeQueue>,
    clock: Arc<C>,
    batch_size: usize,
}

impl<S, C> OutboxRelay<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Entries published per pass when nothing else is configured.
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    /// Creates a relay with the default batch size.
    #[must_use]
    pub const fn new(store: Arc<S>, queue: Arc<dyn StatusChangeQueue>, clock: Arc<C>) -> Self {
        Self {
            store,
            queue,
            clock,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many entries one pass publishes at most.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Returns the most entries one pass publishes.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Publishes up to one batch of pending entries in recording order and
    /// returns how many were published.
    ///
    /// Stops at the first entry the queue refuses so later entries are not
    /// published ahead of it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] when the outbox cannot be read or
    /// marked, or [`RelayError::Queue`] when the queue refuses an entry.
    pub async fn relay_once(&self) -> Result<usize, RelayError> {
        let pending = self.store.pending_outbox(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut published = Vec::with_capacity(pending.len());
        let mut refusal = None;
        for entry in &pending {
            match self.queue.enqueue(*entry.event()).await {
                Ok(delivery_id) => {
                    debug!(
                        outbox_id = %entry.id(),
                        %delivery_id,
                        task_id = %entry.event().task_id,
                        "outbox entry published"
                    );
                    published.push(entry.id());
                }
                Err(err) => {
                    warn!(
                        outbox_id = %entry.id(),
                        task_id = %entry.event().task_id,
                        error = %err,
                        "enqueue failed, leaving entry pending"
                    );
                    refusal = Some(err);
                    break;
                }
            }
        }

        if !published.is_empty() {
            self.store
                .mark_published(&published, self.clock.utc())
                .await?;
            info!(
                queue = self.queue.name(),
                published = published.len(),
                "outbox relayed"
            );
        }

        let count = published.len();
        refusal.map_or(Ok(count), |source| {
            Err(RelayError::Queue {
                published: count,
                source,
            })
        })
    }
}
