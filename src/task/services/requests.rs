//! Caller-facing request payloads and their explicit validation.
//!
//! Requests carry raw caller input. `validate` turns each into the typed
//! domain value the service operates on, or reports the first problem found.

use super::{TaskServiceError, TaskServiceResult};
use crate::task::domain::{
    BatchAction, OwnerId, TaskDomainError, TaskDraft, TaskId, TaskPatch, TaskPriority,
    TaskStatus, TaskTitle, distinct_ids,
};
use chrono::{DateTime, Utc};

/// Request payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    title: String,
    owner_id: String,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    due_date: Option<DateTime<Utc>>,
}

impl CreateTaskRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(title: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            owner_id: owner_id.into(),
            description: None,
            status: None,
            priority: None,
            due_date: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the initial status by name.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the priority by name.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Validates the request into a task draft.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError`] when the title is empty or too long, the
    /// owner is not a UUID, or the status or priority is unknown.
    pub fn validate(self) -> Result<TaskDraft, TaskDomainError> {
        let title = TaskTitle::new(self.title)?;
        let owner_id = OwnerId::parse(&self.owner_id)?;
        let mut draft = TaskDraft::new(title, owner_id);
        if let Some(description) = self.description {
            draft = draft.with_description(description);
        }
        if let Some(status) = self.status {
            draft = draft.with_status(TaskStatus::try_from(status.as_str())?);
        }
        if let Some(priority) = self.priority {
            draft = draft.with_priority(TaskPriority::try_from(priority.as_str())?);
        }
        if let Some(due_date) = self.due_date {
            draft = draft.with_due_date(due_date);
        }
        Ok(draft)
    }
}

/// Request payload for a partial task update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTaskRequest {
    title: Option<String>,
    description: Option<Option<String>>,
    status: Option<String>,
    priority: Option<String>,
    due_date: Option<Option<DateTime<Utc>>>,
    owner_id: Option<String>,
}

impl UpdateTaskRequest {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Replaces the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Some(description.into()));
        self
    }

    /// Clears the description.
    #[must_use]
    pub fn clear_description(mut self) -> Self {
        self.description = Some(None);
        self
    }

    /// Replaces the status by name.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Replaces the priority by name.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Replaces the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(Some(due_date));
        self
    }

    /// Clears the due date.
    #[must_use]
    pub const fn clear_due_date(mut self) -> Self {
        self.due_date = Some(None);
        self
    }

    /// Reassigns the task by owner id.
    #[must_use]
    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Validates the request into a task patch.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError`] for the same field problems as
    /// [`CreateTaskRequest::validate`].
    pub fn validate(self) -> Result<TaskPatch, TaskDomainError> {
        let mut patch = TaskPatch::default();
        if let Some(title) = self.title {
            patch = patch.with_title(TaskTitle::new(title)?);
        }
        if let Some(description) = self.description {
            patch = patch.with_description(description);
        }
        if let Some(status) = self.status {
            patch = patch.with_status(TaskStatus::try_from(status.as_str())?);
        }
        if let Some(priority) = self.priority {
            patch = patch.with_priority(TaskPriority::try_from(priority.as_str())?);
        }
        if let Some(due_date) = self.due_date {
            patch = patch.with_due_date(due_date);
        }
        if let Some(owner_id) = self.owner_id {
            patch = patch.with_owner_id(OwnerId::parse(&owner_id)?);
        }
        Ok(patch)
    }
}

/// Request payload for a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    task_ids: Vec<String>,
    action: String,
}

/// Validated bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommand {
    /// Action to run.
    pub action: BatchAction,
    /// Distinct task ids, in request order.
    pub task_ids: Vec<TaskId>,
}

impl BatchRequest {
    /// Creates a batch request.
    #[must_use]
    pub fn new(task_ids: impl IntoIterator<Item = String>, action: impl Into<String>) -> Self {
        Self {
            task_ids: task_ids.into_iter().collect(),
            action: action.into(),
        }
    }

    /// Validates the request into a batch command.
    ///
    /// The action is checked first, so an unknown action is reported even
    /// when the ids are also malformed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::UnsupportedOperation`] for actions other
    /// than `complete` and `delete`, and [`TaskServiceError::Validation`]
    /// when the id list is empty or holds a non-UUID value.
    pub fn validate(self) -> TaskServiceResult<BatchCommand> {
        let action = BatchAction::parse(&self.action)
            .ok_or_else(|| TaskServiceError::UnsupportedOperation(self.action.clone()))?;
        if self.task_ids.is_empty() {
            return Err(TaskDomainError::EmptyBatch.into());
        }
        let parsed = self
            .task_ids
            .iter()
            .map(|raw| TaskId::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchCommand {
            action,
            task_ids: distinct_ids(parsed),
        })
    }
}
