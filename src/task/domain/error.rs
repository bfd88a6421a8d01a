//! Error types for task domain validation and parsing.

use thiserror::Error;

/// Errors returned while validating task input and constructing domain
/// values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The task title exceeds the persisted column width.
    #[error("task title is {actual} characters long, maximum is {max}")]
    TitleTooLong {
        /// Maximum accepted length in characters.
        max: usize,
        /// Length of the rejected title.
        actual: usize,
    },

    /// The owner reference is not a UUID.
    #[error("invalid owner id '{0}', expected a UUID")]
    InvalidOwnerId(String),

    /// The task identifier is not a UUID.
    #[error("invalid task id '{0}', expected a UUID")]
    InvalidTaskId(String),

    /// The status value is not recognised.
    #[error(transparent)]
    InvalidStatus(#[from] ParseTaskStatusError),

    /// The priority value is not recognised.
    #[error(transparent)]
    InvalidPriority(#[from] ParseTaskPriorityError),

    /// The requested page number is zero.
    #[error("page must be at least 1, got {0}")]
    InvalidPage(u32),

    /// The requested page size is outside the accepted range.
    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit {
        /// Rejected page size.
        limit: u32,
        /// Largest accepted page size.
        max: u32,
    },

    /// A batch request named no tasks.
    #[error("batch request must name at least one task")]
    EmptyBatch,
}

/// Error returned while parsing a task status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing a task priority.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task priority: {0}")]
pub struct ParseTaskPriorityError(pub String);
