//! Periodic triggering of background jobs.

use super::relay::OutboxRelay;
use super::sweeper::OverdueSweeper;
use crate::task::ports::TaskStore;
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Error reported by a failed tick.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Shortest period [`spawn_periodic`] runs a job at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A unit of background work run on a fixed period.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Returns the name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// Returns the failure of the pass. The schedule keeps running.
    async fn tick(&self) -> Result<(), JobError>;
}

/// Runs `job` every `period` until `shutdown` turns `true` or its sender is
/// dropped.
///
/// The first tick runs immediately. Ticks never overlap; a tick that runs
/// long delays the next one instead of bunching them up. Periods shorter
/// than [`MIN_PERIOD`] are raised to it.
pub fn spawn_periodic(
    job: Arc<dyn ScheduledJob>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = job.name(), ?period, "scheduled job started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(err) = job.tick().await {
                        error!(job = job.name(), error = %err, "scheduled job failed");
                    }
                }
            }
        }
        debug!(job = job.name(), "scheduled job stopped");
    })
}

/// Sweeps for overdue tasks at the clock's current time.
pub struct SweepJob<S: TaskStore, C: Clock + Send + Sync> {
    sweeper: OverdueSweeper<S>,
    clock: Arc<C>,
}

impl<S: TaskStore, C: Clock + Send + Sync> SweepJob<S, C> {
    /// Creates a job running `sweeper` against `clock`.
    #[must_use]
    pub const fn new(sweeper: OverdueSweeper<S>, clock: Arc<C>) -> Self {
        Self { sweeper, clock }
    }
}

#[async_trait]
impl<S: TaskStore, C: Clock + Send + Sync> ScheduledJob for SweepJob<S, C> {
    fn name(&self) -> &'static str {
        "overdue-sweep"
    }

    async fn tick(&self) -> Result<(), JobError> {
        self.sweeper.sweep(self.clock.utc()).await?;
        Ok(())
    }
}

/// Drains the outbox to the queue.
pub struct RelayJob<S: TaskStore, C: Clock + Send + Sync> {
    relay: OutboxRelay<S, C>,
}

impl<S: TaskStore, C: Clock + Send + Sync> RelayJob<S, C> {
    /// Creates a job running `relay`.
    #[must_use]
    pub const fn new(relay: OutboxRelay<S, C>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl<S: TaskStore, C: Clock + Send + Sync> ScheduledJob for RelayJob<S, C> {
    fn name(&self) -> &'static str {
        "outbox-relay"
    }

    async fn tick(&self) -> Result<(), JobError> {
        // Keep draining while full batches come back.
        loop {
            let published = self.relay.relay_once().await?;
            if published < self.relay.batch_size() {
                return Ok(());
            }
        }
    }
}
