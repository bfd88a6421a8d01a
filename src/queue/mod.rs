//! At-least-once delivery of status-change events.
//!
//! The queue is a port so workers, the relay, and the overdue sweeper can run
//! against an in-process channel in tests and a `PostgreSQL` table in
//! production.

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
