//! Taskrelay: task lifecycle management with asynchronous status propagation.
//!
//! Task mutations are committed together with an outbox record announcing
//! any status change. A relay publishes those records to a durable queue,
//! competing workers apply them idempotently behind a revision fence, and a
//! periodic sweep feeds overdue tasks into the same queue.
//!
//! # Architecture
//!
//! Taskrelay follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`task`]: Task model, store port, and the transactional task service
//! - [`queue`]: Status-change queue port with retry and dead-letter handling
//! - [`pipeline`]: Outbox relay, workers, overdue sweeper, and scheduling
//! - [`config`]: Layered runtime configuration
//! - [`observability`]: Log subscriber initialisation

pub mod config;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod task;
