//! Task management with transactional status-change announcements.
//!
//! Task writes and the events announcing their status changes land in the
//! store in one atomic unit; the outbox is drained to the queue separately.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
