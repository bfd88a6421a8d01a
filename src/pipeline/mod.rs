//! Background pipeline moving status changes from the store to the workers.
//!
//! - [`OutboxRelay`] publishes committed announcements to the queue.
//! - [`StatusChangeWorker`] applies queued events through the task service.
//! - [`OverdueSweeper`] feeds overdue tasks into the same queue.
//! - [`spawn_periodic`] drives the relay and the sweep on a timer.

mod relay;
mod schedule;
mod sweeper;
mod worker;

pub use relay::{OutboxRelay, RelayError};
pub use schedule::{JobError, MIN_PERIOD, RelayJob, ScheduledJob, SweepJob, spawn_periodic};
pub use sweeper::{OverdueSweeper, SweepReport};
pub use worker::{
    DeliveryOutcome, StatusChangeWorker, WorkerGroup, WorkerStats, WorkerStatsSnapshot,
};

#[cfg(test)]
mod tests;
