//! Delivery model for the status-change queue.

mod delivery;
mod policy;

pub use delivery::{DeadLetter, DeliveryId, ExhaustedRetryError, FailureDisposition, QueueCounts};
pub use policy::{DeliveryPolicy, TASK_PROCESSING_QUEUE};
