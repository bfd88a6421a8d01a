//! Application services for task orchestration.

pub mod access;
mod lifecycle;
mod requests;

pub use access::{
    AccessError, Principal, Role, ensure_admin, ensure_visible, scope_filter, scope_statistics,
};
pub use lifecycle::{StatusApplication, TaskService, TaskServiceError, TaskServiceResult};
pub use requests::{BatchCommand, BatchRequest, CreateTaskRequest, UpdateTaskRequest};
