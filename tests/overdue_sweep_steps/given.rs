//! Given steps for overdue sweep BDD scenarios.

use super::world::{OverdueWorld, run_async};
use chrono::Duration;
use eyre::WrapErr;
use rstest_bdd_macros::given;
use taskrelay::task::services::CreateTaskRequest;

fn create_task(
    world: &mut OverdueWorld,
    title: String,
    due_offset: Duration,
    status: String,
) -> Result<(), eyre::Report> {
    let request = CreateTaskRequest::new(title.clone(), world.owner.clone())
        .with_due_date(world.now + due_offset)
        .with_status(status);
    let created = run_async(world.service.create(request)).wrap_err("create scenario task")?;
    world.tasks.insert(title, created);
    Ok(())
}

fn hours(count: u64) -> Result<Duration, eyre::Report> {
    let whole = i64::try_from(count).wrap_err("hour offset out of range")?;
    Ok(Duration::hours(whole))
}

#[given(r#"a task "{title}" due {count:u64} hours ago with status "{status}""#)]
fn late_task(
    world: &mut OverdueWorld,
    title: String,
    count: u64,
    status: String,
) -> Result<(), eyre::Report> {
    let offset = hours(count)?;
    create_task(world, title, -offset, status)
}

#[given(r#"a task "{title}" due in {count:u64} hours with status "{status}""#)]
fn upcoming_task(
    world: &mut OverdueWorld,
    title: String,
    count: u64,
    status: String,
) -> Result<(), eyre::Report> {
    let offset = hours(count)?;
    create_task(world, title, offset, status)
}
