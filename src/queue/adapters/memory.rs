//! In-process status-change queue.
//!
//! Events live in memory and are lost with the process, so this adapter
//! suits tests and single-process setups. Retries wait in a min-heap keyed
//! by due time; idle consumers park on a [`Notify`] until an event is
//! enqueued, a retry falls due, or the queue closes.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::queue::{
    domain::{
        DeadLetter, DeliveryId, DeliveryPolicy, ExhaustedRetryError, FailureDisposition,
        QueueCounts, TASK_PROCESSING_QUEUE,
    },
    ports::{LeaseAttempt, QueueError, QueueResult, StatusChangeDelivery, StatusChangeQueue},
};
use crate::task::domain::StatusChangeEvent;

/// Retry waiting for its backoff to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledRetry {
    due: Instant,
    id: DeliveryId,
}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the heap pops the earliest due time first.
        other.due.cmp(&self.due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Queued,
    InFlight,
    RetryScheduled,
}

#[derive(Debug)]
struct DeliveryRecord {
    event: StatusChangeEvent,
    attempts: u32,
    state: RecordState,
}

#[derive(Debug, Default)]
struct QueueState {
    records: HashMap<DeliveryId, DeliveryRecord>,
    ready: VecDeque<DeliveryId>,
    scheduled: BinaryHeap<ScheduledRetry>,
    dead: Vec<DeadLetter>,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        while self.scheduled.peek().is_some_and(|entry| entry.due <= now) {
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.id)
                && record.state == RecordState::RetryScheduled
            {
                record.state = RecordState::Queued;
                self.ready.push_back(entry.id);
            }
        }
    }

    fn take_ready(&mut self) -> Option<(DeliveryId, StatusChangeEvent, u32)> {
        while let Some(id) = self.ready.pop_front() {
            if let Some(record) = self.records.get_mut(&id)
                && record.state == RecordState::Queued
            {
                record.state = RecordState::InFlight;
                record.attempts += 1;
                return Some((id, record.event, record.attempts));
            }
        }
        None
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                RecordState::Queued => counts.queued += 1,
                RecordState::InFlight => counts.in_flight += 1,
                RecordState::RetryScheduled => counts.retry_scheduled += 1,
            }
        }
        counts.dead = u64::try_from(self.dead.len()).unwrap_or(u64::MAX);
        counts
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    policy: DeliveryPolicy,
}

/// In-memory implementation of [`StatusChangeQueue`].
#[derive(Debug, Clone)]
pub struct InMemoryStatusChangeQueue {
    shared: Arc<Shared>,
}

impl InMemoryStatusChangeQueue {
    /// Creates a queue with the default delivery policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(DeliveryPolicy::default())
    }

    /// Creates a queue with the given delivery policy.
    #[must_use]
    pub fn with_policy(policy: DeliveryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                policy,
            }),
        }
    }

    /// Stops accepting events. Consumers drain what is ready, then
    /// [`StatusChangeQueue::lease`] returns `None`.
    pub async fn close(&self) {
        self.shared.state.lock().await.closed = true;
        self.shared.notify.notify_waiters();
    }
}

impl Default for InMemoryStatusChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusChangeQueue for InMemoryStatusChangeQueue {
    fn name(&self) -> &str {
        TASK_PROCESSING_QUEUE
    }

    async fn enqueue(&self, event: StatusChangeEvent) -> QueueResult<DeliveryId> {
        let id = DeliveryId::new();
        {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.records.insert(
                id,
                DeliveryRecord {
                    event,
                    attempts: 0,
                    state: RecordState::Queued,
                },
            );
            state.ready.push_back(id);
        }
        self.shared.notify.notify_one();
        debug!(delivery_id = %id, task_id = %event.task_id, status = %event.status, "event enqueued");
        Ok(id)
    }

    async fn try_lease(&self) -> QueueResult<LeaseAttempt> {
        let mut state = self.shared.state.lock().await;
        state.promote_due(Instant::now());
        if let Some((id, event, attempt)) = state.take_ready() {
            return Ok(LeaseAttempt::Leased(Box::new(InMemoryDelivery {
                id,
                event,
                attempt,
                shared: Arc::clone(&self.shared),
            })));
        }
        Ok(if state.closed {
            LeaseAttempt::Closed
        } else {
            LeaseAttempt::Empty
        })
    }

    async fn wait_for_ready(&self) {
        let notified = self.shared.notify.notified();
        tokio::pin!(notified);
        // Registered before the state check so a wake in between is kept.
        notified.as_mut().enable();

        let next_due = {
            let mut state = self.shared.state.lock().await;
            state.promote_due(Instant::now());
            if state.closed || !state.ready.is_empty() {
                return;
            }
            state.scheduled.peek().map(|entry| entry.due)
        };

        match next_due {
            Some(due) => {
                tokio::select! {
                    () = &mut notified => {}
                    () = tokio::time::sleep_until(due) => {}
                }
            }
            None => notified.await,
        }
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        Ok(self.shared.state.lock().await.counts())
    }

    async fn dead_letters(&self) -> QueueResult<Vec<DeadLetter>> {
        Ok(self.shared.state.lock().await.dead.clone())
    }
}

/// Lease on one in-memory event.
struct InMemoryDelivery {
    id: DeliveryId,
    event: StatusChangeEvent,
    attempt: u32,
    shared: Arc<Shared>,
}

#[async_trait]
impl StatusChangeDelivery for InMemoryDelivery {
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
        let mut state = self.shared.state.lock().await;
        let held = state
            .records
            .get(&self.id)
            .is_some_and(|record| record.state == RecordState::InFlight);
        if !held {
            return Err(QueueError::LeaseLost(self.id));
        }
        state.records.remove(&self.id);
        debug!(delivery_id = %self.id, task_id = %self.event.task_id, "delivery acknowledged");
        Ok(())
    }

    async fn fail(self: Box<Self>, reason: String) -> QueueResult<FailureDisposition> {
        let policy = self.shared.policy;
        let disposition = {
            let mut state = self.shared.state.lock().await;
            let Some(record) = state.records.get_mut(&self.id) else {
                return Err(QueueError::LeaseLost(self.id));
            };
            if record.state != RecordState::InFlight {
                return Err(QueueError::LeaseLost(self.id));
            }

            if policy.is_exhausted(record.attempts) {
                let error = ExhaustedRetryError {
                    delivery_id: self.id,
                    task_id: self.event.task_id,
                    attempts: record.attempts,
                    last_error: reason,
                };
                state.records.remove(&self.id);
                state.dead.push(DeadLetter {
                    event: self.event,
                    error: error.clone(),
                });
                FailureDisposition::DeadLettered(error)
            } else {
                let after = policy.backoff_after(record.attempts);
                let attempt = record.attempts;
                record.state = RecordState::RetryScheduled;
                state.scheduled.push(ScheduledRetry {
                    due: Instant::now() + after,
                    id: self.id,
                });
                FailureDisposition::Retry { attempt, after }
            }
        };

        match &disposition {
            FailureDisposition::Retry { attempt, after } => {
                warn!(
                    delivery_id = %self.id,
                    task_id = %self.event.task_id,
                    attempt,
                    retry_in_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
                    "delivery failed, retry scheduled"
                );
                // Wake an idle consumer so it re-arms its timer for this retry.
                self.shared.notify.notify_one();
            }
            FailureDisposition::DeadLettered(err) => {
                error!(
                    delivery_id = %self.id,
                    task_id = %self.event.task_id,
                    status = %self.event.status,
                    attempts = err.attempts,
                    last_error = %err.last_error,
                    "delivery dead-lettered"
                );
            }
        }
        Ok(disposition)
    }
}
