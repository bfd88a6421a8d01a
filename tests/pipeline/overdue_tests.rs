//! Overdue sweeps mark late tasks through the queue.

use super::helpers::{Pipeline, pipeline};
use chrono::{Duration, Utc};
use rstest::rstest;
use taskrelay::task::domain::TaskStatus;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sweep_marks_only_late_unfinished_tasks(pipeline: Pipeline) {
    let now = Utc::now();
    let late = pipeline
        .create(pipeline.request("Late").with_due_date(now - Duration::hours(3)))
        .await;
    let finished = pipeline
        .create(
            pipeline
                .request("Finished")
                .with_due_date(now - Duration::hours(3))
                .with_status("COMPLETED"),
        )
        .await;
    let upcoming = pipeline
        .create(pipeline.request("Upcoming").with_due_date(now + Duration::hours(3)))
        .await;
    let undated = pipeline.create(pipeline.request("Undated")).await;

    let report = pipeline.sweeper.sweep(now).await.expect("sweep");
    pipeline.drain().await;

    assert_eq!((report.processed, report.enqueued), (1, 1));
    assert_eq!(pipeline.status_of(late.id()).await, TaskStatus::Overdue);
    assert_eq!(pipeline.status_of(finished.id()).await, TaskStatus::Completed);
    assert_eq!(pipeline.status_of(upcoming.id()).await, TaskStatus::Pending);
    assert_eq!(pipeline.status_of(undated.id()).await, TaskStatus::Pending);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_sweeps_are_absorbed(pipeline: Pipeline) {
    let now = Utc::now();
    let late = pipeline
        .create(pipeline.request("Late").with_due_date(now - Duration::hours(1)))
        .await;

    pipeline.sweeper.sweep(now).await.expect("first sweep");
    pipeline.sweeper.sweep(now).await.expect("second sweep");
    pipeline.drain().await;

    let stats = pipeline.worker.stats();
    assert_eq!((stats.applied, stats.stale), (1, 1));
    let stored = pipeline.service.find_one(late.id()).await.expect("stored");
    assert_eq!(stored.status(), TaskStatus::Overdue);
    assert_eq!(stored.revision().value(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completion_before_processing_wins(pipeline: Pipeline) {
    let now = Utc::now();
    let late = pipeline
        .create(pipeline.request("Late").with_due_date(now - Duration::hours(1)))
        .await;
    pipeline.sweeper.sweep(now).await.expect("sweep");

    pipeline
        .service
        .update_status(late.id(), TaskStatus::Completed)
        .await
        .expect("complete");
    pipeline.drain().await;

    assert_eq!(pipeline.status_of(late.id()).await, TaskStatus::Completed);
    assert_eq!(pipeline.worker.stats().stale, 1);
}
