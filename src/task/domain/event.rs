//! Status-change announcements and their outbox records.

use super::{Task, TaskId, TaskRevision, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Instruction to move a task to `status`.
///
/// `revision` is the task revision the event was derived from. A consumer
/// holding a newer stored revision treats the event as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    /// Task the change applies to.
    pub task_id: TaskId,
    /// Target status.
    pub status: TaskStatus,
    /// Revision of the task when the event was produced.
    pub revision: TaskRevision,
}

impl StatusChangeEvent {
    /// Creates an event announcing the task's current status at its current
    /// revision.
    #[must_use]
    pub const fn announcing(task: &Task) -> Self {
        Self {
            task_id: task.id(),
            status: task.status(),
            revision: task.revision(),
        }
    }

    /// Creates an event requesting `status` for `task`, fenced at the task's
    /// current revision.
    #[must_use]
    pub const fn targeting(task: &Task, status: TaskStatus) -> Self {
        Self {
            task_id: task.id(),
            status,
            revision: task.revision(),
        }
    }
}

/// Identifier of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(Uuid);

impl OutboxId {
    /// Creates a new random outbox identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an outbox identifier from an existing UUID.
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

impl Default for OutboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status-change event recorded in the same write as the task mutation
/// that produced it, awaiting publication to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    id: OutboxId,
    event: StatusChangeEvent,
    recorded_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Creates a new, unpublished outbox record.
    #[must_use]
    pub fn new(event: StatusChangeEvent, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: OutboxId::new(),
            event,
            recorded_at,
        }
    }

    /// Reconstructs an outbox record from storage.
    #[must_use]
    pub const fn from_persisted(
        id: OutboxId,
        event: StatusChangeEvent,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event,
            recorded_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> OutboxId {
        self.id
    }

    /// Returns the recorded event.
    #[must_use]
    pub const fn event(&self) -> &StatusChangeEvent {
        &self.event
    }

    /// Returns when the record was written.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
