//! Diesel row models for task persistence.

use super::schema::{task_status_outbox, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Priority.
    pub priority: String,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Owning user reference.
    pub owner_id: uuid::Uuid,
    /// Write revision.
    pub revision: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Priority.
    pub priority: String,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Owning user reference.
    pub owner_id: uuid::Uuid,
    /// Write revision.
    pub revision: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Changeset applied when a task is saved. `None` clears nullable columns.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskChangeset {
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Priority.
    pub priority: String,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Owning user reference.
    pub owner_id: uuid::Uuid,
    /// Write revision.
    pub revision: i64,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for outbox records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_status_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxRow {
    /// Outbox record identifier.
    pub id: uuid::Uuid,
    /// Task the event refers to.
    pub task_id: uuid::Uuid,
    /// Target status.
    pub status: String,
    /// Task revision the event was derived from.
    pub revision: i64,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Insert model for outbox records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_status_outbox)]
pub struct NewOutboxRow {
    /// Outbox record identifier.
    pub id: uuid::Uuid,
    /// Task the event refers to.
    pub task_id: uuid::Uuid,
    /// Target status.
    pub status: String,
    /// Task revision the event was derived from.
    pub revision: i64,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts returned by the statistics query.
#[derive(Debug, Clone, QueryableByName)]
pub struct StatisticsRow {
    /// All matching tasks.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub total: i64,
    /// Completed tasks.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub completed: i64,
    /// In-progress tasks.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub in_progress: i64,
    /// Pending tasks.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub pending: i64,
    /// High-priority tasks.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub high_priority: i64,
}
