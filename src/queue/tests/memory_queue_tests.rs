//! Behavioural tests for the in-memory status-change queue.

use crate::queue::{
    adapters::memory::InMemoryStatusChangeQueue,
    domain::{DeliveryPolicy, FailureDisposition, QueueCounts},
    ports::{LeaseAttempt, QueueError, StatusChangeQueue},
};
use crate::task::domain::{StatusChangeEvent, TaskId, TaskRevision, TaskStatus};
use rstest::{fixture, rstest};
use std::time::Duration;

const BACKOFF: Duration = Duration::from_millis(5);
const LEASE_TIMEOUT: Duration = Duration::from_secs(2);

#[fixture]
fn queue() -> InMemoryStatusChangeQueue {
    InMemoryStatusChangeQueue::with_policy(DeliveryPolicy::exponential(2, BACKOFF))
}

fn event() -> StatusChangeEvent {
    StatusChangeEvent {
        task_id: TaskId::new(),
        status: TaskStatus::Overdue,
        revision: TaskRevision::INITIAL,
    }
}

async fn lease_now(
    queue: &InMemoryStatusChangeQueue,
) -> Box<dyn crate::queue::ports::StatusChangeDelivery> {
    tokio::time::timeout(LEASE_TIMEOUT, queue.lease())
        .await
        .expect("lease within timeout")
        .expect("lease succeeds")
        .expect("queue is open")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn acked_delivery_leaves_the_queue(queue: InMemoryStatusChangeQueue) {
    let sent = event();
    let id = queue.enqueue(sent).await.expect("enqueue");

    let delivery = lease_now(&queue).await;
    assert_eq!(delivery.id(), id);
    assert_eq!(*delivery.event(), sent);
    assert_eq!(delivery.attempt(), 1);
    assert_eq!(
        queue.counts().await.expect("counts"),
        QueueCounts {
            in_flight: 1,
            ..QueueCounts::default()
        }
    );

    delivery.ack().await.expect("ack");

    assert_eq!(queue.counts().await.expect("counts").outstanding(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_delivery_is_redelivered_after_backoff(queue: InMemoryStatusChangeQueue) {
    queue.enqueue(event()).await.expect("enqueue");

    let first = lease_now(&queue).await;
    let disposition = first.fail("store unavailable".to_owned()).await.expect("fail");
    assert_eq!(
        disposition,
        FailureDisposition::Retry {
            attempt: 1,
            after: BACKOFF,
        }
    );

    let second = lease_now(&queue).await;
    assert_eq!(second.attempt(), 2);
    second.ack().await.expect("ack");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exhausted_delivery_is_dead_lettered(queue: InMemoryStatusChangeQueue) {
    let sent = event();
    queue.enqueue(sent).await.expect("enqueue");

    let first = lease_now(&queue).await;
    first.fail("boom".to_owned()).await.expect("first failure");
    let second = lease_now(&queue).await;
    let disposition = second.fail("boom again".to_owned()).await.expect("final failure");

    let FailureDisposition::DeadLettered(error) = disposition else {
        panic!("expected a dead letter, got {disposition:?}");
    };
    assert_eq!(error.attempts, 2);
    assert_eq!(error.task_id, sent.task_id);
    assert_eq!(error.last_error, "boom again");

    let dead = queue.dead_letters().await.expect("dead letters");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead.first().map(|letter| letter.event), Some(sent));
    let counts = queue.counts().await.expect("counts");
    assert_eq!(counts.dead, 1);
    assert_eq!(counts.outstanding(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closed_queue_drains_then_ends(queue: InMemoryStatusChangeQueue) {
    queue.enqueue(event()).await.expect("enqueue");
    queue.close().await;

    assert!(matches!(
        queue.enqueue(event()).await,
        Err(QueueError::Closed)
    ));
    lease_now(&queue).await.ack().await.expect("ack");
    let after_drain = tokio::time::timeout(LEASE_TIMEOUT, queue.lease())
        .await
        .expect("lease returns")
        .expect("lease succeeds");
    assert!(after_drain.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deliveries_are_shared_between_consumers(queue: InMemoryStatusChangeQueue) {
    queue.enqueue(event()).await.expect("enqueue first");
    queue.enqueue(event()).await.expect("enqueue second");

    let first = lease_now(&queue).await;
    let second = lease_now(&queue).await;

    assert_ne!(first.id(), second.id());
    first.ack().await.expect("ack first");
    second.ack().await.expect("ack second");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn idle_lease_wakes_on_enqueue(queue: InMemoryStatusChangeQueue) {
    let consumer = queue.clone();
    let waiting = tokio::spawn(async move { lease_now(&consumer).await.attempt() });

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.enqueue(event()).await.expect("enqueue");

    assert_eq!(waiting.await.expect("consumer task"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn try_lease_reports_empty_then_closed(queue: InMemoryStatusChangeQueue) {
    let idle = queue.try_lease().await.expect("try lease");
    assert!(matches!(idle, LeaseAttempt::Empty));

    queue.close().await;
    tokio::time::timeout(LEASE_TIMEOUT, queue.wait_for_ready())
        .await
        .expect("closing wakes waiters");
    let closed = queue.try_lease().await.expect("try lease");

    assert!(matches!(closed, LeaseAttempt::Closed));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn wait_for_ready_wakes_when_a_retry_falls_due(queue: InMemoryStatusChangeQueue) {
    queue.enqueue(event()).await.expect("enqueue");
    lease_now(&queue)
        .await
        .fail("boom".to_owned())
        .await
        .expect("fail");

    tokio::time::timeout(LEASE_TIMEOUT, queue.wait_for_ready())
        .await
        .expect("retry falls due");
    let retried = queue.try_lease().await.expect("try lease");

    assert!(matches!(retried, LeaseAttempt::Leased(delivery) if delivery.attempt() == 2));
}
