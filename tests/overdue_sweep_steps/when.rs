//! When steps for overdue sweep BDD scenarios.

use std::time::Duration;

use super::world::{OverdueWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use taskrelay::{queue::ports::StatusChangeQueue, task::services::UpdateTaskRequest};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[when("the overdue sweep runs")]
fn sweep_runs(world: &mut OverdueWorld) -> Result<(), eyre::Report> {
    let report = run_async(world.sweeper.sweep(world.now)).wrap_err("run overdue sweep")?;
    world.last_sweep = Some(report);
    Ok(())
}

#[when(r#"task "{title}" is moved to "{status}""#)]
fn task_moved(world: &mut OverdueWorld, title: String, status: String) -> Result<(), eyre::Report> {
    let id = world.task_id(&title)?;
    let updated = run_async(
        world
            .service
            .update(id, UpdateTaskRequest::new().with_status(status)),
    )
    .wrap_err("update scenario task")?;
    world.tasks.insert(title, updated);
    Ok(())
}

#[when("the outbox is relayed")]
fn outbox_relayed(world: &mut OverdueWorld) -> Result<(), eyre::Report> {
    run_async(world.relay.relay_once()).wrap_err("relay outbox")?;
    Ok(())
}

#[when("the workers drain the queue")]
fn workers_drain(world: &mut OverdueWorld) -> Result<(), eyre::Report> {
    let drained = run_async(tokio::time::timeout(DRAIN_TIMEOUT, async {
        while world.queue.counts().await?.outstanding() > 0 {
            world.worker.run_once().await?;
        }
        Ok::<(), taskrelay::queue::ports::QueueError>(())
    }))
    .wrap_err("queue did not drain in time")?;
    drained.wrap_err("process queued deliveries")
}
