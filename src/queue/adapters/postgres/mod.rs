//! `PostgreSQL` adapter for the status-change queue.

mod models;
mod queue;

pub use queue::PostgresStatusChangeQueue;
