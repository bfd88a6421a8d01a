//! Behaviour tests for overdue detection and status-change delivery.

#[path = "overdue_sweep_steps/mod.rs"]
mod overdue_sweep_steps_defs;

use overdue_sweep_steps_defs::world::{OverdueWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/overdue_sweep.feature",
    name = "Late tasks are marked overdue"
)]
#[tokio::test(flavor = "multi_thread")]
async fn late_tasks_are_marked_overdue(world: OverdueWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/overdue_sweep.feature",
    name = "A task completed before its overdue event is processed stays completed"
)]
#[tokio::test(flavor = "multi_thread")]
async fn completed_task_is_not_overwritten(world: OverdueWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/overdue_sweep.feature",
    name = "Status changes are announced through the outbox"
)]
#[tokio::test(flavor = "multi_thread")]
async fn status_changes_are_announced(world: OverdueWorld) {
    let _ = world;
}
