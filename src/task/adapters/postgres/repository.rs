//! `PostgreSQL` implementation of the task store and its outbox.

use super::{
    models::{NewOutboxRow, NewTaskRow, OutboxRow, StatisticsRow, TaskChangeset, TaskRow},
    schema::{task_status_outbox, tasks},
};
use crate::task::{
    domain::{
        OutboxEntry, OutboxId, OwnerId, PageRequest, PersistedTaskData, StatusChangeEvent, Task,
        TaskFilter, TaskId, TaskPage, TaskPriority, TaskRevision, TaskStatistics, TaskStatus,
        TaskTitle,
    },
    ports::{TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type shared by the persistence adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn insert(
        &self,
        task: &Task,
        announcement: Option<&OutboxEntry>,
    ) -> TaskStoreResult<()> {
        let task_id = task.id();
        let new_row = to_new_row(task)?;
        let outbox_row = announcement.map(to_outbox_row).transpose()?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                diesel::insert_into(tasks::table)
                    .values(&new_row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            TaskStoreError::DuplicateTask(task_id)
                        }
                        _ => TaskStoreError::persistence(err),
                    })?;
                insert_outbox_row(tx, outbox_row.as_ref())
            })
        })
        .await
    }

    async fn save(
        &self,
        task: &Task,
        expected: TaskRevision,
        announcement: Option<&OutboxEntry>,
    ) -> TaskStoreResult<()> {
        let task_id = task.id();
        let changeset = to_changeset(task)?;
        let outbox_row = announcement.map(to_outbox_row).transpose()?;
        let expected_value = revision_to_column(expected)?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let updated = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(task_id.into_inner()))
                        .filter(tasks::revision.eq(expected_value)),
                )
                .set(&changeset)
                .execute(tx)?;

                if updated == 0 {
                    let stored = tasks::table
                        .find(task_id.into_inner())
                        .select(tasks::revision)
                        .first::<i64>(tx)
                        .optional()?;
                    return Err(match stored {
                        None => TaskStoreError::NotFound(task_id),
                        Some(value) => TaskStoreError::RevisionConflict {
                            id: task_id,
                            expected,
                            actual: revision_from_column(value)?,
                        },
                    });
                }

                insert_outbox_row(tx, outbox_row.as_ref())
            })
        })
        .await
    }

    async fn delete(&self, id: TaskId) -> TaskStoreResult<()> {
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(tasks::table.find(id.into_inner())).execute(connection)?;
            if deleted == 0 {
                return Err(TaskStoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .find(id.into_inner())
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_page(&self, filter: &TaskFilter, page: PageRequest) -> TaskStoreResult<TaskPage> {
        let lookup_filter = *filter;
        let offset = i64::try_from(page.offset()).map_err(TaskStoreError::persistence)?;
        let limit = i64::from(page.limit());

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let total: i64 = filtered_tasks(&lookup_filter).count().get_result(tx)?;
                let rows = filtered_tasks(&lookup_filter)
                    .order((tasks::created_at.asc(), tasks::id.asc()))
                    .limit(limit)
                    .offset(offset)
                    .select(TaskRow::as_select())
                    .load::<TaskRow>(tx)?;
                let items = rows
                    .into_iter()
                    .map(row_to_task)
                    .collect::<TaskStoreResult<Vec<_>>>()?;
                let total_count = u64::try_from(total).map_err(TaskStoreError::persistence)?;
                Ok(TaskPage::new(items, total_count, page))
            })
        })
        .await
    }

    async fn aggregate_stats(&self, owner_id: Option<OwnerId>) -> TaskStoreResult<TaskStatistics> {
        let owner = owner_id.map(OwnerId::into_inner);
        self.run_blocking(move |connection| {
            let row = diesel::sql_query(concat!(
                "SELECT COUNT(*) AS total, ",
                "COUNT(*) FILTER (WHERE status = 'COMPLETED') AS completed, ",
                "COUNT(*) FILTER (WHERE status = 'IN_PROGRESS') AS in_progress, ",
                "COUNT(*) FILTER (WHERE status = 'PENDING') AS pending, ",
                "COUNT(*) FILTER (WHERE priority = 'HIGH') AS high_priority ",
                "FROM tasks WHERE ($1::uuid IS NULL OR owner_id = $1)",
            ))
            .bind::<diesel::sql_types::Nullable<diesel::sql_types::Uuid>, _>(owner)
            .get_result::<StatisticsRow>(connection)?;
            row_to_statistics(&row)
        })
        .await
    }

    async fn batch_set_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> TaskStoreResult<u64> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let affected = diesel::update(tasks::table.filter(tasks::id.eq_any(uuids)))
                    .set((
                        tasks::status.eq(status.as_str()),
                        tasks::revision.eq(tasks::revision + 1_i64),
                        tasks::updated_at.eq(at),
                    ))
                    .execute(tx)?;
                u64::try_from(affected).map_err(TaskStoreError::persistence)
            })
        })
        .await
    }

    async fn batch_delete(&self, ids: &[TaskId]) -> TaskStoreResult<u64> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let affected =
                    diesel::delete(tasks::table.filter(tasks::id.eq_any(uuids))).execute(tx)?;
                u64::try_from(affected).map_err(TaskStoreError::persistence)
            })
        })
        .await
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> TaskStoreResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::due_date.lt(now))
                .filter(tasks::status.ne(TaskStatus::Completed.as_str()))
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn pending_outbox(&self, limit: usize) -> TaskStoreResult<Vec<OutboxEntry>> {
        let row_limit = i64::try_from(limit).map_err(TaskStoreError::persistence)?;
        self.run_blocking(move |connection| {
            let rows = task_status_outbox::table
                .filter(task_status_outbox::published_at.is_null())
                .order((
                    task_status_outbox::created_at.asc(),
                    task_status_outbox::id.asc(),
                ))
                .limit(row_limit)
                .select(OutboxRow::as_select())
                .load::<OutboxRow>(connection)?;
            rows.into_iter().map(row_to_outbox_entry).collect()
        })
        .await
    }

    async fn mark_published(&self, ids: &[OutboxId], at: DateTime<Utc>) -> TaskStoreResult<u64> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            let marked = diesel::update(
                task_status_outbox::table
                    .filter(task_status_outbox::id.eq_any(uuids))
                    .filter(task_status_outbox::published_at.is_null()),
            )
            .set(task_status_outbox::published_at.eq(Some(at)))
            .execute(connection)?;
            u64::try_from(marked).map_err(TaskStoreError::persistence)
        })
        .await
    }
}

fn filtered_tasks(filter: &TaskFilter) -> tasks::BoxedQuery<'static, Pg> {
    let mut query = tasks::table.into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(tasks::status.eq(status.as_str()));
    }
    if let Some(priority) = filter.priority {
        query = query.filter(tasks::priority.eq(priority.as_str()));
    }
    if let Some(owner_id) = filter.owner_id {
        query = query.filter(tasks::owner_id.eq(owner_id.into_inner()));
    }
    query
}

fn insert_outbox_row(
    connection: &mut PgConnection,
    row: Option<&NewOutboxRow>,
) -> TaskStoreResult<()> {
    if let Some(outbox_row) = row {
        diesel::insert_into(task_status_outbox::table)
            .values(outbox_row)
            .execute(connection)?;
    }
    Ok(())
}

fn revision_to_column(revision: TaskRevision) -> TaskStoreResult<i64> {
    i64::try_from(revision.value()).map_err(TaskStoreError::persistence)
}

fn revision_from_column(value: i64) -> TaskStoreResult<TaskRevision> {
    u64::try_from(value)
        .map(TaskRevision::new)
        .map_err(TaskStoreError::persistence)
}

fn count_from_column(value: i64) -> TaskStoreResult<u64> {
    u64::try_from(value).map_err(TaskStoreError::persistence)
}

fn to_new_row(task: &Task) -> TaskStoreResult<NewTaskRow> {
    Ok(NewTaskRow {
        id: task.id().into_inner(),
        title: task.title().as_str().to_owned(),
        description: task.description().map(str::to_owned),
        status: task.status().as_str().to_owned(),
        priority: task.priority().as_str().to_owned(),
        due_date: task.due_date(),
        owner_id: task.owner_id().into_inner(),
        revision: revision_to_column(task.revision())?,
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    })
}

fn to_changeset(task: &Task) -> TaskStoreResult<TaskChangeset> {
    Ok(TaskChangeset {
        title: task.title().as_str().to_owned(),
        description: task.description().map(str::to_owned),
        status: task.status().as_str().to_owned(),
        priority: task.priority().as_str().to_owned(),
        due_date: task.due_date(),
        owner_id: task.owner_id().into_inner(),
        revision: revision_to_column(task.revision())?,
        updated_at: task.updated_at(),
    })
}

fn to_outbox_row(entry: &OutboxEntry) -> TaskStoreResult<NewOutboxRow> {
    let event = entry.event();
    Ok(NewOutboxRow {
        id: entry.id().into_inner(),
        task_id: event.task_id.into_inner(),
        status: event.status.as_str().to_owned(),
        revision: revision_to_column(event.revision)?,
        created_at: entry.recorded_at(),
    })
}

fn row_to_task(row: TaskRow) -> TaskStoreResult<Task> {
    let TaskRow {
        id,
        title,
        description,
        status,
        priority,
        due_date,
        owner_id,
        revision,
        created_at,
        updated_at,
    } = row;

    let data = PersistedTaskData {
        id: TaskId::from_uuid(id),
        title: TaskTitle::new(title).map_err(TaskStoreError::persistence)?,
        description,
        status: TaskStatus::try_from(status.as_str()).map_err(TaskStoreError::persistence)?,
        priority: TaskPriority::try_from(priority.as_str())
            .map_err(TaskStoreError::persistence)?,
        due_date,
        owner_id: OwnerId::from_uuid(owner_id),
        revision: revision_from_column(revision)?,
        created_at,
        updated_at,
    };
    Ok(Task::from_persisted(data))
}

fn row_to_outbox_entry(row: OutboxRow) -> TaskStoreResult<OutboxEntry> {
    let event = StatusChangeEvent {
        task_id: TaskId::from_uuid(row.task_id),
        status: TaskStatus::try_from(row.status.as_str()).map_err(TaskStoreError::persistence)?,
        revision: revision_from_column(row.revision)?,
    };
    Ok(OutboxEntry::from_persisted(
        OutboxId::from_uuid(row.id),
        event,
        row.created_at,
    ))
}

fn row_to_statistics(row: &StatisticsRow) -> TaskStoreResult<TaskStatistics> {
    Ok(TaskStatistics {
        total: count_from_column(row.total)?,
        completed: count_from_column(row.completed)?,
        in_progress: count_from_column(row.in_progress)?,
        pending: count_from_column(row.pending)?,
        high_priority: count_from_column(row.high_priority)?,
    })
}
