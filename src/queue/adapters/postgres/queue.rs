//! `PostgreSQL`-backed status-change queue.
//!
//! Deliveries are rows in `status_change_deliveries`. Consumers claim rows
//! with `FOR UPDATE SKIP LOCKED`, so any number of workers across processes
//! can compete on one channel. A claim is a lease: until `visible_at`
//! passes, no other consumer sees the row. Leases that lapse without an ack
//! make the row deliverable again, and a lapsed final attempt is
//! dead-lettered.

use super::models::{BucketCountRow, DeliveryRow};
use crate::queue::{
    domain::{
        DeadLetter, DeliveryId, DeliveryPolicy, ExhaustedRetryError, FailureDisposition,
        QueueCounts, TASK_PROCESSING_QUEUE,
    },
    ports::{LeaseAttempt, QueueError, QueueResult, StatusChangeDelivery, StatusChangeQueue},
};
use crate::task::adapters::postgres::TaskPgPool;
use crate::task::domain::{StatusChangeEvent, TaskId, TaskRevision, TaskStatus};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Integer, Text, Uuid};
use std::time::Duration;
use tracing::{debug, error, warn};

const DELIVERY_COLUMNS: &str =
    "id, task_id, status, revision, attempts, max_attempts, last_error";

/// `PostgreSQL` implementation of [`StatusChangeQueue`].
#[derive(Debug, Clone)]
pub struct PostgresStatusChangeQueue {
    pool: TaskPgPool,
    queue_name: String,
    policy: DeliveryPolicy,
    lease_timeout: Duration,
    poll_interval: Duration,
}

impl PostgresStatusChangeQueue {
    /// Lease length used when none is configured.
    pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Idle polling interval used when none is configured.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// Creates a queue on the `task-processing` channel with the default
    /// delivery policy.
    #[must_use]
    pub fn new(pool: TaskPgPool) -> Self {
        Self {
            pool,
            queue_name: TASK_PROCESSING_QUEUE.to_owned(),
            policy: DeliveryPolicy::default(),
            lease_timeout: Self::DEFAULT_LEASE_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the delivery policy applied to newly enqueued events.
    #[must_use]
    pub const fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how long a lease hides a delivery from other consumers.
    #[must_use]
    pub const fn with_lease_timeout(mut self, lease_timeout: Duration) -> Self {
        self.lease_timeout = lease_timeout;
        self
    }

    /// Sets how long an idle consumer waits between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn run_blocking<F, T>(&self, f: F) -> QueueResult<T>
    where
        F: FnOnce(&mut PgConnection) -> QueueResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(&self.pool, f).await
    }

    async fn lease_row(&self) -> QueueResult<Option<PostgresDelivery>> {
        let queue_name = self.queue_name.clone();
        let lease_secs = self.lease_timeout.as_secs_f64();
        let row = self
            .run_blocking(move |connection| {
                connection.transaction::<_, QueueError, _>(|tx| {
                    reap_lapsed_final_attempts(tx, &queue_name)?;
                    diesel::sql_query(format!(
                        concat!(
                            "WITH next AS (",
                            "SELECT id FROM status_change_deliveries ",
                            "WHERE queue_name = $1 AND state IN ('queued', 'leased') ",
                            "AND visible_at <= now() AND attempts < max_attempts ",
                            "ORDER BY visible_at, enqueued_at LIMIT 1 ",
                            "FOR UPDATE SKIP LOCKED) ",
                            "UPDATE status_change_deliveries d SET state = 'leased', ",
                            "attempts = d.attempts + 1, ",
                            "visible_at = now() + make_interval(secs => $2), ",
                            "updated_at = now() ",
                            "FROM next WHERE d.id = next.id RETURNING {}",
                        ),
                        qualified_columns("d"),
                    ))
                    .bind::<Text, _>(queue_name.as_str())
                    .bind::<Double, _>(lease_secs)
                    .get_result::<DeliveryRow>(tx)
                    .optional()
                    .map_err(QueueError::transient)
                })
            })
            .await?;

        row.map(|leased| PostgresDelivery::from_row(&leased, self))
            .transpose()
    }
}

#[async_trait]
impl StatusChangeQueue for PostgresStatusChangeQueue {
    fn name(&self) -> &str {
        &self.queue_name
    }

    async fn enqueue(&self, event: StatusChangeEvent) -> QueueResult<DeliveryId> {
        let id = DeliveryId::new();
        let queue_name = self.queue_name.clone();
        let revision = i64::try_from(event.revision.value()).map_err(QueueError::transient)?;
        let max_attempts =
            i32::try_from(self.policy.max_attempts()).map_err(QueueError::transient)?;

        self.run_blocking(move |connection| {
            diesel::sql_query(concat!(
                "INSERT INTO status_change_deliveries ",
                "(id, queue_name, task_id, status, revision, state, attempts, max_attempts, ",
                "last_error, visible_at, enqueued_at, updated_at) ",
                "VALUES ($1, $2, $3, $4, $5, 'queued', 0, $6, NULL, now(), now(), now())",
            ))
            .bind::<Uuid, _>(id.into_inner())
            .bind::<Text, _>(queue_name.as_str())
            .bind::<Uuid, _>(event.task_id.into_inner())
            .bind::<Text, _>(event.status.as_str())
            .bind::<BigInt, _>(revision)
            .bind::<Integer, _>(max_attempts)
            .execute(connection)
            .map_err(QueueError::transient)?;
            Ok(())
        })
        .await?;

        debug!(delivery_id = %id, task_id = %event.task_id, status = %event.status, "event enqueued");
        Ok(id)
    }

    async fn try_lease(&self) -> QueueResult<LeaseAttempt> {
        Ok(self
            .lease_row()
            .await?
            .map_or(LeaseAttempt::Empty, |delivery| {
                LeaseAttempt::Leased(Box::new(delivery))
            }))
    }

    async fn wait_for_ready(&self) {
        tokio::time::sleep(self.poll_interval).await;
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let queue_name = self.queue_name.clone();
        let rows = self
            .run_blocking(move |connection| {
                diesel::sql_query(concat!(
                    "SELECT CASE WHEN state = 'queued' AND attempts > 0 ",
                    "THEN 'retry_scheduled' ELSE state END AS bucket, ",
                    "COUNT(*) AS total FROM status_change_deliveries ",
                    "WHERE queue_name = $1 GROUP BY bucket",
                ))
                .bind::<Text, _>(queue_name.as_str())
                .load::<BucketCountRow>(connection)
                .map_err(QueueError::transient)
            })
            .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let total = u64::try_from(row.total).map_err(QueueError::transient)?;
            match row.bucket.as_str() {
                "queued" => counts.queued = total,
                "retry_scheduled" => counts.retry_scheduled = total,
                "leased" => counts.in_flight = total,
                "dead" => counts.dead = total,
                other => warn!(bucket = other, "ignoring unknown delivery state"),
            }
        }
        Ok(counts)
    }

    async fn dead_letters(&self) -> QueueResult<Vec<DeadLetter>> {
        let queue_name = self.queue_name.clone();
        let rows = self
            .run_blocking(move |connection| {
                diesel::sql_query(format!(
                    concat!(
                        "SELECT {} FROM status_change_deliveries ",
                        "WHERE queue_name = $1 AND state = 'dead' ORDER BY updated_at, id",
                    ),
                    DELIVERY_COLUMNS,
                ))
                .bind::<Text, _>(queue_name.as_str())
                .load::<DeliveryRow>(connection)
                .map_err(QueueError::transient)
            })
            .await?;
        rows.into_iter().map(row_to_dead_letter).collect()
    }
}

/// Lease on one `PostgreSQL` delivery row.
#[derive(Debug)]
struct PostgresDelivery {
    id: DeliveryId,
    event: StatusChangeEvent,
    attempt: u32,
    max_attempts: u32,
    pool: TaskPgPool,
    policy: DeliveryPolicy,
}

impl PostgresDelivery {
    fn from_row(row: &DeliveryRow, queue: &PostgresStatusChangeQueue) -> QueueResult<Self> {
        Ok(Self {
            id: DeliveryId::from_uuid(row.id),
            event: row_to_event(row)?,
            attempt: u32::try_from(row.attempts).map_err(QueueError::transient)?,
            max_attempts: u32::try_from(row.max_attempts).map_err(QueueError::transient)?,
            pool: queue.pool.clone(),
            policy: queue.policy,
        })
    }

    fn attempt_column(&self) -> QueueResult<i32> {
        i32::try_from(self.attempt).map_err(QueueError::transient)
    }
}

#[async_trait]
impl StatusChangeDelivery for PostgresDelivery {
    fn id(&self) -> DeliveryId {
        self.id
    }

    fn event(&self) -> &StatusChangeEvent {
        &self.event
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    async fn ack(self: Box<Self>) -> QueueResult<()> {
        let id = self.id;
        let attempt = self.attempt_column()?;
        let deleted = run_blocking(&self.pool, move |connection| {
            diesel::sql_query(concat!(
                "DELETE FROM status_change_deliveries ",
                "WHERE id = $1 AND state = 'leased' AND attempts = $2",
            ))
            .bind::<Uuid, _>(id.into_inner())
            .bind::<Integer, _>(attempt)
            .execute(connection)
            .map_err(QueueError::transient)
        })
        .await?;

        if deleted == 0 {
            return Err(QueueError::LeaseLost(id));
        }
        debug!(delivery_id = %id, task_id = %self.event.task_id, "delivery acknowledged");
        Ok(())
    }

    async fn fail(self: Box<Self>, reason: String) -> QueueResult<FailureDisposition> {
        let id = self.id;
        let attempt = self.attempt_column()?;
        let exhausted = self.attempt >= self.max_attempts;
        let backoff = self.policy.backoff_after(self.attempt);
        let last_error = reason.clone();

        let updated = run_blocking(&self.pool, move |connection| {
            let result = if exhausted {
                diesel::sql_query(concat!(
                    "UPDATE status_change_deliveries ",
                    "SET state = 'dead', last_error = $3, updated_at = now() ",
                    "WHERE id = $1 AND state = 'leased' AND attempts = $2",
                ))
                .bind::<Uuid, _>(id.into_inner())
                .bind::<Integer, _>(attempt)
                .bind::<Text, _>(last_error)
                .execute(connection)
            } else {
                diesel::sql_query(concat!(
                    "UPDATE status_change_deliveries ",
                    "SET state = 'queued', last_error = $3, ",
                    "visible_at = now() + make_interval(secs => $4), updated_at = now() ",
                    "WHERE id = $1 AND state = 'leased' AND attempts = $2",
                ))
                .bind::<Uuid, _>(id.into_inner())
                .bind::<Integer, _>(attempt)
                .bind::<Text, _>(last_error)
                .bind::<Double, _>(backoff.as_secs_f64())
                .execute(connection)
            };
            result.map_err(QueueError::transient)
        })
        .await?;

        if updated == 0 {
            return Err(QueueError::LeaseLost(id));
        }

        if exhausted {
            let err = ExhaustedRetryError {
                delivery_id: id,
                task_id: self.event.task_id,
                attempts: self.attempt,
                last_error: reason,
            };
            error!(
                delivery_id = %id,
                task_id = %self.event.task_id,
                status = %self.event.status,
                attempts = self.attempt,
                last_error = %err.last_error,
                "delivery dead-lettered"
            );
            Ok(FailureDisposition::DeadLettered(err))
        } else {
            warn!(
                delivery_id = %id,
                task_id = %self.event.task_id,
                attempt = self.attempt,
                retry_in_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "delivery failed, retry scheduled"
            );
            Ok(FailureDisposition::Retry {
                attempt: self.attempt,
                after: backoff,
            })
        }
    }
}

async fn run_blocking<F, T>(pool: &TaskPgPool, f: F) -> QueueResult<T>
where
    F: FnOnce(&mut PgConnection) -> QueueResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = pool.get().map_err(QueueError::transient)?;
        f(&mut connection)
    })
    .await
    .map_err(QueueError::transient)?
}

impl From<diesel::result::Error> for QueueError {
    fn from(err: diesel::result::Error) -> Self {
        Self::transient(err)
    }
}

/// Dead-letters leases that lapsed on their final attempt.
fn reap_lapsed_final_attempts(connection: &mut PgConnection, queue_name: &str) -> QueueResult<()> {
    let reaped = diesel::sql_query(format!(
        concat!(
            "UPDATE status_change_deliveries ",
            "SET state = 'dead', last_error = COALESCE(last_error, 'lease expired'), ",
            "updated_at = now() ",
            "WHERE queue_name = $1 AND state = 'leased' AND visible_at <= now() ",
            "AND attempts >= max_attempts RETURNING {}",
        ),
        DELIVERY_COLUMNS,
    ))
    .bind::<Text, _>(queue_name)
    .load::<DeliveryRow>(connection)?;

    for row in reaped {
        error!(
            delivery_id = %row.id,
            task_id = %row.task_id,
            status = %row.status,
            attempts = row.attempts,
            "lease lapsed on final attempt, delivery dead-lettered"
        );
    }
    Ok(())
}

fn qualified_columns(alias: &str) -> String {
    DELIVERY_COLUMNS
        .split(", ")
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_event(row: &DeliveryRow) -> QueueResult<StatusChangeEvent> {
    Ok(StatusChangeEvent {
        task_id: TaskId::from_uuid(row.task_id),
        status: TaskStatus::try_from(row.status.as_str()).map_err(QueueError::transient)?,
        revision: u64::try_from(row.revision)
            .map(TaskRevision::new)
            .map_err(QueueError::transient)?,
    })
}

fn row_to_dead_letter(row: DeliveryRow) -> QueueResult<DeadLetter> {
    let event = row_to_event(&row)?;
    Ok(DeadLetter {
        event,
        error: ExhaustedRetryError {
            delivery_id: DeliveryId::from_uuid(row.id),
            task_id: event.task_id,
            attempts: u32::try_from(row.attempts).map_err(QueueError::transient)?,
            last_error: row.last_error.unwrap_or_default(),
        },
    })
}
