//! Runs the status-change pipeline against `PostgreSQL`.
//!
//! Usage:
//!
//! ```text
//! TASKRELAY__DATABASE_URL=postgres://localhost/tasks taskrelay
//! ```
//!
//! The daemon relays the task outbox to the `task-processing` queue, runs
//! the configured number of workers, and sweeps for overdue tasks on a
//! fixed period. Ctrl-C stops the schedules, lets in-flight deliveries
//! settle, and exits.

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use std::sync::Arc;
use taskrelay::config::PipelineConfig;
use taskrelay::observability;
use taskrelay::pipeline::{
    OutboxRelay, OverdueSweeper, RelayJob, StatusChangeWorker, SweepJob, WorkerGroup,
    spawn_periodic,
};
use taskrelay::queue::adapters::PostgresStatusChangeQueue;
use taskrelay::queue::ports::StatusChangeQueue;
use taskrelay::task::adapters::postgres::{PostgresTaskStore, TaskPgPool};
use taskrelay::task::services::TaskService;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::{debug, info};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    if !observability::init() {
        debug!("reusing installed tracing subscriber");
    }
    let config = PipelineConfig::load()?;
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

    Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(&config, pool))
}

async fn run(config: &PipelineConfig, pool: TaskPgPool) -> Result<(), BoxError> {
    let clock = Arc::new(DefaultClock);
    let store = Arc::new(PostgresTaskStore::new(pool.clone()));
    let queue: Arc<dyn StatusChangeQueue> = Arc::new(
        PostgresStatusChangeQueue::new(pool)
            .with_policy(config.delivery_policy())
            .with_lease_timeout(config.lease_timeout())
            .with_poll_interval(config.poll_interval()),
    );

    let worker = StatusChangeWorker::new(
        TaskService::new(Arc::clone(&store), Arc::clone(&clock)),
        Arc::clone(&queue),
    );
    let workers = WorkerGroup::spawn(config.worker_count, &worker);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::clone(&queue), Arc::clone(&clock))
        .with_batch_size(config.relay_batch_size);
    let relay_handle = spawn_periodic(
        Arc::new(RelayJob::new(relay)),
        config.relay_interval(),
        shutdown_rx.clone(),
    );
    let sweep_handle = spawn_periodic(
        Arc::new(SweepJob::new(OverdueSweeper::new(store, queue), clock)),
        config.sweep_interval(),
        shutdown_rx,
    );
    info!(
        workers = config.worker_count,
        relay_interval_ms = config.relay_interval_ms,
        sweep_interval_secs = config.sweep_interval_secs,
        "taskrelay running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown_tx.send_modify(|stop| *stop = true);
    relay_handle.await?;
    sweep_handle.await?;
    workers.shutdown_and_join().await;

    let stats = serde_json::to_string(&worker.stats())?;
    info!(%stats, "taskrelay stopped");
    Ok(())
}
