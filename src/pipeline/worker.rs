//! Competing consumers that apply queued status changes.

use crate::queue::domain::FailureDisposition;
use crate::queue::ports::{LeaseAttempt, QueueResult, StatusChangeDelivery, StatusChangeQueue};
use crate::task::ports::TaskStore;
use crate::task::services::{StatusApplication, TaskService};
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target status was written.
    Applied,
    /// The task already had the target status.
    Unchanged,
    /// The task moved on since the event was produced; the event was
    /// dropped.
    Stale,
    /// Application failed and the queue will redeliver.
    Retrying {
        /// Attempt that failed.
        attempt: u32,
        /// Delay before redelivery.
        after: Duration,
    },
    /// Application failed on the final attempt.
    DeadLettered,
}

/// Running totals for a worker and its clones.
#[derive(Debug, Default)]
pub struct WorkerStats {
    applied: AtomicU64,
    unchanged: AtomicU64,
    stale: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Deliveries whose status was written.
    pub applied: u64,
    /// Deliveries that found the status already current.
    pub unchanged: u64,
    /// Deliveries discarded as stale.
    pub stale: u64,
    /// Failed attempts, including those later retried.
    pub failed: u64,
    /// Deliveries abandoned after their final attempt.
    pub dead_lettered: u64,
}

impl WorkerStats {
    /// Returns the current totals.
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Applied => &self.applied,
            DeliveryOutcome::Unchanged => &self.unchanged,
            DeliveryOutcome::Stale => &self.stale,
            DeliveryOutcome::Retrying { .. } => &self.failed,
            DeliveryOutcome::DeadLettered => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                &self.dead_lettered
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Applies status-change deliveries through the task service.
///
/// Clones share the queue, the service, and the statistics.
pub struct StatusChangeWorker<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    service: TaskService<S, C>,
    queue: Arc<dyn StatusChangeQueue>,
    stats: Arc<WorkerStats>,
}

impl<S, C> Clone for StatusChangeWorker<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S, C> StatusChangeWorker<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a worker consuming from `queue`.
    #[must_use]
    pub fn new(service: TaskService<S, C>, queue: Arc<dyn StatusChangeQueue>) -> Self {
        Self {
            service,
            queue,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Returns the shared statistics.
    #[must_use]
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Leases one delivery and processes it.
    ///
    /// Returns `None` when the queue is closed and drained.
    ///
    /// # Errors
    ///
    /// Returns a queue error when leasing or settling the delivery fails.
    pub async fn run_once(&self) -> QueueResult<Option<DeliveryOutcome>> {
        let Some(delivery) = self.queue.lease().await? else {
            return Ok(None);
        };
        self.process_one(delivery).await.map(Some)
    }

    /// Applies one leased delivery, then acks it or reports the failure to
    /// the queue.
    ///
    /// Stale events are acknowledged: redelivering them can never succeed.
    ///
    /// # Errors
    ///
    /// Returns a queue error when the delivery cannot be settled.
    pub async fn process_one(
        &self,
        delivery: Box<dyn StatusChangeDelivery>,
    ) -> QueueResult<DeliveryOutcome> {
        let event = *delivery.event();
        let attempt = delivery.attempt();
        let outcome = match self.service.apply_status_change(&event).await {
            Ok(application) => {
                delivery.ack().await?;
                match application {
                    StatusApplication::Applied(_) => DeliveryOutcome::Applied,
                    StatusApplication::Unchanged(_) => DeliveryOutcome::Unchanged,
                    StatusApplication::Stale { event: produced, current } => {
                        debug!(
                            task_id = %event.task_id,
                            status = %event.status,
                            event_revision = %produced,
                            current_revision = %current,
                            "stale status change discarded"
                        );
                        DeliveryOutcome::Stale
                    }
                }
            }
            Err(err) => {
                warn!(
                    task_id = %event.task_id,
                    status = %event.status,
                    attempt,
                    error = %err,
                    "status change failed"
                );
                match delivery.fail(err.to_string()).await? {
                    FailureDisposition::Retry { attempt: failed, after } => {
                        DeliveryOutcome::Retrying {
                            attempt: failed,
                            after,
                        }
                    }
                    FailureDisposition::DeadLettered(_) => DeliveryOutcome::DeadLettered,
                }
            }
        };
        self.stats.record(&outcome);
        Ok(outcome)
    }
}

/// Handle to a set of spawned workers.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawns `count` clones of `worker` onto the current runtime.
    #[must_use]
    pub fn spawn<S, C>(count: usize, worker: &StatusChangeWorker<S, C>) -> Self
    where
        S: TaskStore + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = (0..count)
            .map(|worker_id| {
                let consumer = worker.clone();
                let rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, consumer, rx))
            })
            .collect();
        info!(workers = count, "status-change workers started");
        Self { shutdown_tx, joins }
    }

    /// Asks every worker to stop after its current delivery.
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_modify(|stop| *stop = true);
    }

    /// Stops every worker and waits for them to finish.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                error!(error = %err, "worker task ended abnormally");
            }
        }
        info!("status-change workers stopped");
    }
}

async fn worker_loop<S, C>(
    worker_id: usize,
    worker: StatusChangeWorker<S, C>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Only the wait is raced against shutdown. A lease in progress always
        // completes so no attempt is spent on a delivery nobody holds.
        match worker.queue.try_lease().await {
            Ok(LeaseAttempt::Leased(delivery)) => {
                if let Err(err) = worker.process_one(delivery).await {
                    error!(worker_id, error = %err, "failed to settle delivery");
                }
            }
            Ok(LeaseAttempt::Empty) => {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = worker.queue.wait_for_ready() => {}
                }
            }
            Ok(LeaseAttempt::Closed) => break,
            Err(err) => {
                error!(worker_id, error = %err, "lease failed");
                tokio::time::sleep(LEASE_ERROR_PAUSE).await;
            }
        }
    }
    debug!(worker_id, "worker exiting");
}

const LEASE_ERROR_PAUSE: Duration = Duration::from_millis(500);
