//! Domain model for tasks and their status-change announcements.
//!
//! Keeps validation, revision bookkeeping, and listing semantics free of
//! infrastructure concerns.

mod batch;
mod error;
mod event;
mod ids;
mod query;
mod task;

pub use batch::{BatchAction, BatchOutcome, distinct_ids};
pub use error::{ParseTaskPriorityError, ParseTaskStatusError, TaskDomainError};
pub use event::{OutboxEntry, OutboxId, StatusChangeEvent};
pub use ids::{OwnerId, TaskId, TaskRevision, TaskTitle};
pub use query::{PageRequest, TaskFilter, TaskPage, TaskStatistics};
pub use task::{PersistedTaskData, Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus};
