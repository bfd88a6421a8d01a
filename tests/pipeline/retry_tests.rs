//! Redelivery and dead-lettering across the pipeline.

use super::helpers::Pipeline;
use rstest::rstest;
use std::time::Duration;
use taskrelay::{
    queue::{domain::DeliveryPolicy, ports::StatusChangeQueue},
    task::domain::{StatusChangeEvent, TaskStatus},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn events_for_removed_tasks_end_as_dead_letters() {
    let pipeline = Pipeline::with_policy(DeliveryPolicy::exponential(3, Duration::from_millis(2)));
    let task = pipeline.create(pipeline.request("Short lived")).await;
    let event = StatusChangeEvent::targeting(&task, TaskStatus::Overdue);
    pipeline.service.remove(task.id()).await.expect("remove");
    pipeline.queue.enqueue(event).await.expect("enqueue");

    pipeline.drain().await;

    let dead = pipeline.queue.dead_letters().await.expect("dead letters");
    assert_eq!(dead.len(), 1);
    let letter = dead.first().expect("one dead letter");
    assert_eq!(letter.event, event);
    assert_eq!(letter.error.attempts, 3);
    assert!(letter.error.last_error.contains("not found"));
    let stats = pipeline.worker.stats();
    assert_eq!((stats.failed, stats.dead_lettered), (3, 1));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn removing_a_task_discards_its_unrelayed_announcements() {
    let pipeline = Pipeline::with_policy(DeliveryPolicy::default());
    let task = pipeline.create(pipeline.request("Short lived")).await;

    pipeline.service.remove(task.id()).await.expect("remove");

    assert_eq!(pipeline.relay.relay_once().await.expect("relay"), 0);
    assert_eq!(
        pipeline.queue.counts().await.expect("counts").outstanding(),
        0
    );
}
