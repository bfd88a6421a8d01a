//! Store port for task persistence and the status-change outbox.

use crate::task::domain::{
    OutboxEntry, OutboxId, OwnerId, PageRequest, Task, TaskFilter, TaskId, TaskPage,
    TaskRevision, TaskStatistics, TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Task persistence contract.
///
/// Every mutating method is one atomic unit: the task write and the optional
/// outbox record either both become visible or neither does.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores a new task, recording `announcement` in the outbox in the same
    /// write.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the identifier already
    /// exists.
    async fn insert(&self, task: &Task, announcement: Option<&OutboxEntry>)
    -> TaskStoreResult<()>;

    /// Replaces a stored task if its stored revision is still `expected`,
    /// recording `announcement` in the outbox in the same write.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist, or
    /// [`TaskStoreError::RevisionConflict`] when another write got there
    /// first.
    async fn save(
        &self,
        task: &Task,
        expected: TaskRevision,
        announcement: Option<&OutboxEntry>,
    ) -> TaskStoreResult<()>;

    /// Deletes a task together with its unpublished outbox records.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    async fn delete(&self, id: TaskId) -> TaskStoreResult<()>;

    /// Finds a task by identifier. Returns `None` when absent.
    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>>;

    /// Returns one page of tasks matching `filter`, ordered by creation time
    /// then identifier.
    async fn find_page(&self, filter: &TaskFilter, page: PageRequest) -> TaskStoreResult<TaskPage>;

    /// Counts tasks by status and priority, optionally for a single owner.
    /// All counts are zero when nothing matches.
    async fn aggregate_stats(&self, owner_id: Option<OwnerId>) -> TaskStoreResult<TaskStatistics>;

    /// Sets `status` on every stored task named in `ids`, stamping each
    /// write at `at`. Unknown ids are skipped and repeated ids count once.
    /// Returns the number of tasks touched.
    async fn batch_set_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> TaskStoreResult<u64>;

    /// Deletes every stored task named in `ids`. Unknown ids are skipped and
    /// repeated ids count once. Returns the number of tasks deleted.
    async fn batch_delete(&self, ids: &[TaskId]) -> TaskStoreResult<u64>;

    /// Returns tasks whose due date is before `now` and whose status is not
    /// `COMPLETED`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> TaskStoreResult<Vec<Task>>;

    /// Returns up to `limit` unpublished outbox records, oldest first.
    async fn pending_outbox(&self, limit: usize) -> TaskStoreResult<Vec<OutboxEntry>>;

    /// Marks outbox records as published at `at`. Published records no
    /// longer appear in [`Self::pending_outbox`] and may be discarded.
    /// Returns how many records changed.
    async fn mark_published(&self, ids: &[OutboxId], at: DateTime<Utc>) -> TaskStoreResult<u64>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The stored revision moved on since the task was read.
    #[error("task {id} changed concurrently: expected revision {expected}, found {actual}")]
    RevisionConflict {
        /// Task being written.
        id: TaskId,
        /// Revision the writer read.
        expected: TaskRevision,
        /// Revision currently stored.
        actual: TaskRevision,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
