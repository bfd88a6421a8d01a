//! Tests for periodic job triggering.

use crate::pipeline::{JobError, ScheduledJob, spawn_periodic};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const PERIOD: Duration = Duration::from_millis(10);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CountingJob {
    ticks: AtomicUsize,
    failing: bool,
}

#[async_trait]
impl ScheduledJob for CountingJob {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn tick(&self) -> Result<(), JobError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Box::new(io::Error::other("tick failed")));
        }
        Ok(())
    }
}

async fn wait_for_ticks(job: &CountingJob, wanted: usize) {
    tokio::time::timeout(STOP_TIMEOUT, async {
        while job.ticks.load(Ordering::SeqCst) < wanted {
            tokio::time::sleep(PERIOD).await;
        }
    })
    .await
    .expect("job ticks");
}

#[tokio::test(flavor = "multi_thread")]
async fn job_ticks_until_shutdown() {
    let job = Arc::new(CountingJob::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_periodic(job.clone(), PERIOD, shutdown_rx);

    wait_for_ticks(&job, 3).await;
    shutdown_tx.send_modify(|stop| *stop = true);

    tokio::time::timeout(STOP_TIMEOUT, handle)
        .await
        .expect("schedule stops")
        .expect("schedule task");
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_ticks_do_not_stop_the_schedule() {
    let job = Arc::new(CountingJob {
        ticks: AtomicUsize::new(0),
        failing: true,
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_periodic(job.clone(), PERIOD, shutdown_rx);

    wait_for_ticks(&job, 3).await;
    drop(shutdown_tx);

    tokio::time::timeout(STOP_TIMEOUT, handle)
        .await
        .expect("schedule stops when the sender is dropped")
        .expect("schedule task");
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_period_is_raised_to_the_minimum() {
    let job = Arc::new(CountingJob::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_periodic(job.clone(), Duration::ZERO, shutdown_rx);

    wait_for_ticks(&job, 2).await;
    shutdown_tx.send_modify(|stop| *stop = true);

    tokio::time::timeout(STOP_TIMEOUT, handle)
        .await
        .expect("schedule stops")
        .expect("schedule task survives a zero period");
}
