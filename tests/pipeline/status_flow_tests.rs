//! Status changes travel from the outbox through the queue to the workers.

use super::helpers::{DRAIN_TIMEOUT, Pipeline, pipeline};
use rstest::rstest;
use taskrelay::{
    pipeline::WorkerGroup,
    queue::ports::StatusChangeQueue,
    task::{
        domain::TaskStatus,
        ports::TaskStore,
        services::UpdateTaskRequest,
    },
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_tasks_are_announced_once_relayed(pipeline: Pipeline) {
    pipeline.create(pipeline.request("Write report")).await;
    pipeline.create(pipeline.request("Plan sprint")).await;
    assert_eq!(
        pipeline.queue.counts().await.expect("counts").outstanding(),
        0
    );

    let published = pipeline.relay.relay_once().await.expect("relay");

    assert_eq!(published, 2);
    assert_eq!(pipeline.queue.counts().await.expect("counts").queued, 2);
    assert!(pipeline.store.pending_outbox(10).await.expect("outbox").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn relayed_announcements_settle_without_further_writes(pipeline: Pipeline) {
    let task = pipeline.create(pipeline.request("Write report")).await;
    pipeline
        .service
        .update(task.id(), UpdateTaskRequest::new().with_status("IN_PROGRESS"))
        .await
        .expect("update");
    pipeline.relay.relay_once().await.expect("relay");

    pipeline.drain().await;

    let stats = pipeline.worker.stats();
    assert_eq!((stats.stale, stats.unchanged, stats.applied), (1, 1, 0));
    let stored = pipeline.service.find_one(task.id()).await.expect("stored");
    assert_eq!(stored.status(), TaskStatus::InProgress);
    assert_eq!(stored.revision().value(), 2);
    assert!(pipeline.store.pending_outbox(10).await.expect("outbox").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_group_applies_queued_changes(pipeline: Pipeline) {
    let now = chrono::Utc::now();
    for index in 0..3 {
        pipeline
            .create(
                pipeline
                    .request(&format!("Late {index}"))
                    .with_due_date(now - chrono::Duration::days(1)),
            )
            .await;
    }
    let group = WorkerGroup::spawn(2, &pipeline.worker);

    pipeline.sweeper.sweep(now).await.expect("sweep");
    tokio::time::timeout(DRAIN_TIMEOUT, async {
        while pipeline.worker.stats().applied < 3 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workers apply the sweep");
    group.shutdown_and_join().await;

    let stats = pipeline
        .service
        .get_statistics(None)
        .await
        .expect("statistics");
    assert_eq!((stats.total, stats.pending), (3, 0));
}
