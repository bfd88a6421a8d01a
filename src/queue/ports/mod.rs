//! Port contracts for the status-change queue.

pub mod queue;

pub use queue::{LeaseAttempt, QueueError, QueueResult, StatusChangeDelivery, StatusChangeQueue};
