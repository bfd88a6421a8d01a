//! Overdue detection.

use crate::queue::ports::StatusChangeQueue;
use crate::task::domain::{StatusChangeEvent, TaskStatus};
use crate::task::ports::{TaskStore, TaskStoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue tasks found.
    pub processed: usize,
    /// Events the queue accepted.
    pub enqueued: usize,
}

/// Finds tasks past their due date and asks the workers to mark them
/// `OVERDUE`.
///
/// The sweep reads the store but never writes it. Running it concurrently or
/// repeatedly only produces duplicate events, which the workers absorb.
pub struct OverdueSweeper<S: TaskStore> {
    store: Arc<S>,
    queue: Arc<dyn StatusChangeQueue>,
}

impl<S: TaskStore> OverdueSweeper<S> {
    /// Creates a sweeper reading `store` and publishing to `queue`.
    #[must_use]
    pub const fn new(store: Arc<S>, queue: Arc<dyn StatusChangeQueue>) -> Self {
        Self { store, queue }
    }

    /// Enqueues an `OVERDUE` event for every task with `due_date < now` that
    /// is not `COMPLETED`.
    ///
    /// Tasks the queue refuses are logged and skipped; the next sweep picks
    /// them up again.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError`] when the scan fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, TaskStoreError> {
        let overdue = self.store.find_overdue(now).await?;
        let mut report = SweepReport {
            processed: overdue.len(),
            enqueued: 0,
        };

        for task in &overdue {
            let event = StatusChangeEvent::targeting(task, TaskStatus::Overdue);
            match self.queue.enqueue(event).await {
                Ok(_) => report.enqueued += 1,
                Err(err) => warn!(
                    task_id = %task.id(),
                    error = %err,
                    "failed to enqueue overdue event"
                ),
            }
        }

        info!(
            processed = report.processed,
            enqueued = report.enqueued,
            "overdue sweep finished"
        );
        Ok(report)
    }
}
