//! Contract tests for the in-memory task store.

use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{
        OutboxEntry, OwnerId, StatusChangeEvent, Task, TaskDraft, TaskRevision, TaskStatus,
        TaskTitle,
    },
    ports::{TaskStore, TaskStoreError},
};
use chrono::{Duration, Utc};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use uuid::Uuid;

#[fixture]
fn store() -> InMemoryTaskStore {
    InMemoryTaskStore::new()
}

fn task(title: &str) -> Task {
    Task::create(
        TaskDraft::new(
            TaskTitle::new(title).expect("valid title"),
            OwnerId::from_uuid(Uuid::new_v4()),
        ),
        &DefaultClock,
    )
}

fn announcement(task: &Task) -> OutboxEntry {
    OutboxEntry::new(StatusChangeEvent::announcing(task), task.updated_at())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn insert_rejects_duplicate_ids(store: InMemoryTaskStore) {
    let original = task("Original");
    store.insert(&original, None).await.expect("first insert");

    let result = store.insert(&original, None).await;

    assert!(matches!(result, Err(TaskStoreError::DuplicateTask(id)) if id == original.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn save_is_fenced_on_the_expected_revision(store: InMemoryTaskStore) {
    let mut stored = task("Fenced");
    store.insert(&stored, None).await.expect("insert");
    stored.change_status(TaskStatus::InProgress, &DefaultClock);
    store
        .save(&stored, TaskRevision::INITIAL, None)
        .await
        .expect("save at the read revision");

    let mut stale = stored.clone();
    stale.change_status(TaskStatus::Completed, &DefaultClock);
    let result = store.save(&stale, TaskRevision::INITIAL, None).await;

    assert!(matches!(
        result,
        Err(TaskStoreError::RevisionConflict { expected, actual, .. })
            if expected == TaskRevision::INITIAL && actual == TaskRevision::new(2)
    ));
    let current = store
        .find_by_id(stored.id())
        .await
        .expect("lookup")
        .expect("task exists");
    assert_eq!(current.status(), TaskStatus::InProgress);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_save_records_no_announcement(store: InMemoryTaskStore) {
    let stored = task("Atomic");
    store.insert(&stored, None).await.expect("insert");

    let result = store
        .save(&stored, TaskRevision::new(7), Some(&announcement(&stored)))
        .await;

    assert!(result.is_err());
    assert!(store.pending_outbox(10).await.expect("outbox").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn published_entries_leave_the_pending_outbox(store: InMemoryTaskStore) {
    let first = task("First");
    let second = task("Second");
    store
        .insert(&first, Some(&announcement(&first)))
        .await
        .expect("insert first");
    store
        .insert(&second, Some(&announcement(&second)))
        .await
        .expect("insert second");

    let pending = store.pending_outbox(10).await.expect("outbox");
    let first_entry = pending.first().map(OutboxEntry::id).expect("first entry");
    assert_eq!(pending.len(), 2);
    assert_eq!(
        pending.first().map(|entry| entry.event().task_id),
        Some(first.id())
    );

    let marked = store
        .mark_published(&[first_entry], Utc::now())
        .await
        .expect("mark published");
    let remaining = store.pending_outbox(10).await.expect("outbox");

    assert_eq!(marked, 1);
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        remaining.first().map(|entry| entry.event().task_id),
        Some(second.id())
    );
    assert_eq!(store.retained_outbox_len().expect("outbox"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_outbox_honours_the_limit(store: InMemoryTaskStore) {
    for index in 0..5 {
        let created = task(&format!("Task {index}"));
        store
            .insert(&created, Some(&announcement(&created)))
            .await
            .expect("insert");
    }

    assert_eq!(store.pending_outbox(3).await.expect("outbox").len(), 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_drops_pending_announcements(store: InMemoryTaskStore) {
    let doomed = task("Doomed");
    store
        .insert(&doomed, Some(&announcement(&doomed)))
        .await
        .expect("insert");

    store.delete(doomed.id()).await.expect("delete");

    assert!(store.pending_outbox(10).await.expect("outbox").is_empty());
    assert!(matches!(
        store.delete(doomed.id()).await,
        Err(TaskStoreError::NotFound(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn find_overdue_skips_completed_and_future_tasks(store: InMemoryTaskStore) {
    let now = Utc::now();
    let owner = OwnerId::from_uuid(Uuid::new_v4());
    let draft = |title: &str| TaskDraft::new(TaskTitle::new(title).expect("valid title"), owner);

    let late = Task::create(
        draft("Late").with_due_date(now - Duration::days(1)),
        &DefaultClock,
    );
    let done = Task::create(
        draft("Done")
            .with_due_date(now - Duration::days(1))
            .with_status(TaskStatus::Completed),
        &DefaultClock,
    );
    let upcoming = Task::create(
        draft("Upcoming").with_due_date(now + Duration::days(1)),
        &DefaultClock,
    );
    let flagged = Task::create(
        draft("Flagged")
            .with_due_date(now - Duration::days(2))
            .with_status(TaskStatus::Overdue),
        &DefaultClock,
    );
    for created in [&late, &done, &upcoming, &flagged] {
        store.insert(created, None).await.expect("insert");
    }

    let overdue = store.find_overdue(now).await.expect("scan");
    let ids: Vec<_> = overdue.iter().map(Task::id).collect();

    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&late.id()));
    assert!(ids.contains(&flagged.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn batch_set_status_counts_only_stored_tasks(store: InMemoryTaskStore) {
    let stored = task("Stored");
    store.insert(&stored, None).await.expect("insert");

    let affected = store
        .batch_set_status(
            &[stored.id(), task("Missing").id()],
            TaskStatus::Completed,
            Utc::now(),
        )
        .await
        .expect("batch");

    assert_eq!(affected, 1);
    let current = store
        .find_by_id(stored.id())
        .await
        .expect("lookup")
        .expect("task exists");
    assert_eq!(current.status(), TaskStatus::Completed);
    assert_eq!(current.revision(), TaskRevision::new(2));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn published_entries_are_released(store: InMemoryTaskStore) {
    for index in 0..250 {
        let created = task(&format!("Task {index}"));
        store
            .insert(&created, Some(&announcement(&created)))
            .await
            .expect("insert");
    }

    loop {
        let pending = store.pending_outbox(100).await.expect("outbox");
        if pending.is_empty() {
            break;
        }
        let ids: Vec<_> = pending.iter().map(OutboxEntry::id).collect();
        let marked = store
            .mark_published(&ids, Utc::now())
            .await
            .expect("mark published");
        assert_eq!(marked, u64::try_from(ids.len()).expect("small batch"));
    }

    assert_eq!(store.retained_outbox_len().expect("outbox"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_batch_ids_count_once(store: InMemoryTaskStore) {
    let stored = task("Repeated");
    store.insert(&stored, None).await.expect("insert");
    let ids = [stored.id(), stored.id(), stored.id()];

    let completed = store
        .batch_set_status(&ids, TaskStatus::Completed, Utc::now())
        .await
        .expect("batch complete");
    let current = store
        .find_by_id(stored.id())
        .await
        .expect("lookup")
        .expect("task exists");
    let deleted = store.batch_delete(&ids).await.expect("batch delete");

    assert_eq!(completed, 1);
    assert_eq!(current.revision(), TaskRevision::new(2));
    assert_eq!(deleted, 1);
}
