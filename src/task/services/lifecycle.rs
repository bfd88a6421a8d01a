//! Transactional task service: lifecycle operations and status application.

use super::requests::{BatchRequest, CreateTaskRequest, UpdateTaskRequest};
use crate::task::{
    domain::{
        BatchAction, BatchOutcome, OutboxEntry, OwnerId, PageRequest, StatusChangeEvent, Task,
        TaskDomainError, TaskFilter, TaskId, TaskPage, TaskRevision, TaskStatistics, TaskStatus,
    },
    ports::{TaskStore, TaskStoreError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Number of times a read-modify-write is attempted before a revision
/// conflict is returned to the caller.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Service-level errors for task operations.
#[derive(Debug, Error)]
pub enum TaskServiceError {
    /// Caller input failed validation.
    #[error(transparent)]
    Validation(#[from] TaskDomainError),
    /// The task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The batch action is not supported.
    #[error("unsupported batch action: {0}")]
    UnsupportedOperation(String),
    /// The store failed; the operation left no partial effects.
    #[error(transparent)]
    Store(TaskStoreError),
}

impl From<TaskStoreError> for TaskServiceError {
    fn from(err: TaskStoreError) -> Self {
        match err {
            TaskStoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for task service operations.
pub type TaskServiceResult<T> = Result<T, TaskServiceError>;

/// Outcome of applying a status-change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusApplication {
    /// The status was written.
    Applied(Task),
    /// The task already had the target status; nothing was written.
    Unchanged(Task),
    /// The task was written after the event was produced; the event was
    /// discarded.
    Stale {
        /// Revision the event was derived from.
        event: TaskRevision,
        /// Revision currently stored.
        current: TaskRevision,
    },
}

/// What a read-modify-write decided to do with the task it read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Write { announce: bool },
    Unchanged,
    Stale,
}

/// Task orchestration service.
///
/// Every mutation is a single store write. Status changes made by callers
/// are announced through the store's outbox in that same write.
pub struct TaskService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> Clone for TaskService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> TaskService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a new task service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Creates a task and announces its initial status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Validation`] for invalid input or
    /// [`TaskServiceError::Store`] when the write fails.
    pub async fn create(&self, request: CreateTaskRequest) -> TaskServiceResult<Task> {
        let draft = request.validate()?;
        let task = Task::create(draft, &*self.clock);
        let announcement = OutboxEntry::new(StatusChangeEvent::announcing(&task), task.created_at());
        self.store.insert(&task, Some(&announcement)).await?;
        info!(task_id = %task.id(), status = %task.status(), "task created");
        Ok(task)
    }

    /// Lists tasks matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Store`] when the lookup fails.
    pub async fn find_all(
        &self,
        page: PageRequest,
        filter: TaskFilter,
    ) -> TaskServiceResult<TaskPage> {
        Ok(self.store.find_page(&filter, page).await?)
    }

    /// Fetches a single task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::NotFound`] when the task does not exist.
    pub async fn find_one(&self, id: TaskId) -> TaskServiceResult<Task> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(TaskServiceError::NotFound(id))
    }

    /// Applies a partial update. A status change is announced; any other
    /// change is not.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Validation`] for invalid input,
    /// [`TaskServiceError::NotFound`] when the task does not exist, or
    /// [`TaskServiceError::Store`] when the write fails.
    pub async fn update(&self, id: TaskId, request: UpdateTaskRequest) -> TaskServiceResult<Task> {
        let patch = request.validate()?;
        let clock = &*self.clock;
        let (task, _) = self
            .read_modify_write(id, |task| {
                let previous = task.status();
                task.apply_patch(patch.clone(), clock);
                Mutation::Write {
                    announce: task.status() != previous,
                }
            })
            .await?;
        info!(task_id = %id, status = %task.status(), revision = %task.revision(), "task updated");
        Ok(task)
    }

    /// Deletes a task. Nothing is announced.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::NotFound`] when the task does not exist.
    pub async fn remove(&self, id: TaskId) -> TaskServiceResult<()> {
        self.store.delete(id).await?;
        info!(task_id = %id, "task removed");
        Ok(())
    }

    /// Returns aggregate counts, optionally for a single owner.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Store`] when the query fails.
    pub async fn get_statistics(
        &self,
        owner_id: Option<OwnerId>,
    ) -> TaskServiceResult<TaskStatistics> {
        Ok(self.store.aggregate_stats(owner_id).await?)
    }

    /// Runs a bulk action as one atomic write. Ids with no stored task are
    /// skipped; the outcome reports how many tasks were touched.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::UnsupportedOperation`] for unknown
    /// actions, [`TaskServiceError::Validation`] for an empty or malformed id
    /// list, or [`TaskServiceError::Store`] when the write fails.
    pub async fn batch_process(&self, request: BatchRequest) -> TaskServiceResult<BatchOutcome> {
        let command = request.validate()?;
        let affected = match command.action {
            BatchAction::Complete => {
                self.store
                    .batch_set_status(&command.task_ids, TaskStatus::Completed, self.clock.utc())
                    .await?
            }
            BatchAction::Delete => self.store.batch_delete(&command.task_ids).await?,
        };
        let outcome = BatchOutcome {
            action: command.action,
            requested: command.task_ids.len(),
            affected,
        };
        info!(
            action = %outcome.action,
            requested = outcome.requested,
            affected = outcome.affected,
            "batch processed"
        );
        Ok(outcome)
    }

    /// Sets a task's status regardless of its revision.
    ///
    /// Idempotent: when the task already has `status` nothing is written and
    /// the stored task is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::NotFound`] when the task does not exist or
    /// [`TaskServiceError::Store`] when the write fails.
    pub async fn update_status(&self, id: TaskId, status: TaskStatus) -> TaskServiceResult<Task> {
        let clock = &*self.clock;
        let (task, _) = self
            .read_modify_write(id, |task| {
                if task.change_status(status, clock) {
                    Mutation::Write { announce: false }
                } else {
                    Mutation::Unchanged
                }
            })
            .await?;
        Ok(task)
    }

    /// Applies a queued status-change event.
    ///
    /// Events derived from an older revision than the stored one are
    /// discarded. Reapplying an already-current status writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::NotFound`] when the task does not exist or
    /// [`TaskServiceError::Store`] when the write fails.
    pub async fn apply_status_change(
        &self,
        event: &StatusChangeEvent,
    ) -> TaskServiceResult<StatusApplication> {
        let clock = &*self.clock;
        let (task, mutation) = self
            .read_modify_write(event.task_id, |task| {
                if task.revision() > event.revision {
                    Mutation::Stale
                } else if task.change_status(event.status, clock) {
                    Mutation::Write { announce: false }
                } else {
                    Mutation::Unchanged
                }
            })
            .await?;

        Ok(match mutation {
            Mutation::Write { .. } => {
                info!(
                    task_id = %task.id(),
                    status = %task.status(),
                    revision = %task.revision(),
                    "status change applied"
                );
                StatusApplication::Applied(task)
            }
            Mutation::Unchanged => StatusApplication::Unchanged(task),
            Mutation::Stale => StatusApplication::Stale {
                event: event.revision,
                current: task.revision(),
            },
        })
    }

    /// Reads the task, lets `decide` mutate it, and writes it back fenced on
    /// the revision that was read. Conflicts restart from a fresh read.
    async fn read_modify_write<F>(
        &self,
        id: TaskId,
        mut decide: F,
    ) -> TaskServiceResult<(Task, Mutation)>
    where
        F: FnMut(&mut Task) -> Mutation,
    {
        let mut attempt = 1;
        loop {
            let mut task = self.find_one(id).await?;
            let expected = task.revision();
            let mutation = decide(&mut task);
            let Mutation::Write { announce } = mutation else {
                return Ok((task, mutation));
            };

            let announcement = announce.then(|| {
                OutboxEntry::new(StatusChangeEvent::announcing(&task), task.updated_at())
            });
            match self.store.save(&task, expected, announcement.as_ref()).await {
                Ok(()) => return Ok((task, mutation)),
                Err(TaskStoreError::RevisionConflict { actual, .. })
                    if attempt < MAX_WRITE_ATTEMPTS =>
                {
                    debug!(task_id = %id, %expected, %actual, attempt, "revision conflict, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
