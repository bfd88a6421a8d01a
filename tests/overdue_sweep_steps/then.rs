//! Then steps for overdue sweep BDD scenarios.

use super::world::{OverdueWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use taskrelay::{queue::ports::StatusChangeQueue, task::domain::TaskStatus};

#[then(r#"task "{title}" has status "{status}""#)]
fn task_has_status(world: &OverdueWorld, title: String, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let stored = run_async(world.service.find_one(world.task_id(&title)?))
        .wrap_err("look up scenario task")?;

    eyre::ensure!(
        stored.status() == expected,
        "expected {title:?} to be {expected}, found {}",
        stored.status()
    );
    Ok(())
}

#[then("the sweep found {count:u64} overdue task")]
fn sweep_found(world: &OverdueWorld, count: u64) -> Result<(), eyre::Report> {
    let report = world
        .last_sweep
        .ok_or_else(|| eyre::eyre!("the sweep has not run"))?;
    let processed = u64::try_from(report.processed).wrap_err("processed count out of range")?;

    eyre::ensure!(
        processed == count,
        "expected {count} overdue tasks, found {processed}"
    );
    Ok(())
}

#[then("the workers discarded {count:u64} stale event")]
fn workers_discarded(world: &OverdueWorld, count: u64) -> Result<(), eyre::Report> {
    let stale = world.worker.stats().stale;

    eyre::ensure!(stale == count, "expected {count} stale events, found {stale}");
    Ok(())
}

#[then("the queue holds {count:u64} events")]
fn queue_holds(world: &OverdueWorld, count: u64) -> Result<(), eyre::Report> {
    let counts = run_async(world.queue.counts()).wrap_err("read queue counts")?;

    eyre::ensure!(
        counts.queued == count,
        "expected {count} queued events, found {}",
        counts.queued
    );
    Ok(())
}
