//! Authorization guards composed ahead of task service calls.
//!
//! The service itself trusts its caller. A routing layer holding an
//! authenticated [`Principal`] runs the matching guard first and passes the
//! guarded value on.

use crate::task::domain::{OwnerId, Task, TaskFilter, TaskId};
use std::fmt;
use thiserror::Error;

/// Role carried by an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Regular user, limited to their own tasks.
    User,
    /// Administrator with access to every task and to batch operations.
    Admin,
}

impl Role {
    /// Returns the canonical role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    id: OwnerId,
    role: Role,
}

impl Principal {
    /// Creates a principal.
    #[must_use]
    pub const fn new(id: OwnerId, role: Role) -> Self {
        Self { id, role }
    }

    /// Returns the caller's user id.
    #[must_use]
    pub const fn id(&self) -> OwnerId {
        self.id
    }

    /// Returns the caller's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Errors raised by access guards.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// The task is not visible to the caller. Reported as absent so its
    /// existence is not revealed.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The operation needs a role the caller lacks.
    #[error("operation requires role {required}")]
    Forbidden {
        /// Role the operation requires.
        required: Role,
    },
}

/// Narrows a listing filter to what the caller may see.
///
/// Users always see only their own tasks, whatever owner they asked for.
#[must_use]
pub const fn scope_filter(principal: &Principal, filter: TaskFilter) -> TaskFilter {
    if principal.is_admin() {
        filter
    } else {
        filter.with_owner_id(principal.id)
    }
}

/// Resolves the owner whose statistics the caller may read.
#[must_use]
pub const fn scope_statistics(principal: &Principal, requested: Option<OwnerId>) -> Option<OwnerId> {
    if principal.is_admin() {
        requested
    } else {
        Some(principal.id)
    }
}

/// Checks that the caller may read or change `task`.
///
/// # Errors
///
/// Returns [`AccessError::NotFound`] when a user targets another owner's
/// task.
pub fn ensure_visible(principal: &Principal, task: &Task) -> Result<(), AccessError> {
    if principal.is_admin() || task.owner_id() == principal.id {
        Ok(())
    } else {
        Err(AccessError::NotFound(task.id()))
    }
}

/// Checks that the caller is an administrator.
///
/// # Errors
///
/// Returns [`AccessError::Forbidden`] for non-administrators.
pub const fn ensure_admin(principal: &Principal) -> Result<(), AccessError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AccessError::Forbidden {
            required: Role::Admin,
        })
    }
}
