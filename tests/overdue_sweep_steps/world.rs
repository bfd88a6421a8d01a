//! Shared world state for overdue sweep BDD scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::DefaultClock;
use rstest::fixture;
use taskrelay::{
    pipeline::{OutboxRelay, OverdueSweeper, StatusChangeWorker, SweepReport},
    queue::{adapters::memory::InMemoryStatusChangeQueue, ports::StatusChangeQueue},
    task::{
        adapters::memory::InMemoryTaskStore,
        domain::{Task, TaskId},
        services::TaskService,
    },
};
use uuid::Uuid;

/// Service type used by the BDD world.
pub type TestTaskService = TaskService<InMemoryTaskStore, DefaultClock>;

/// Scenario world for overdue sweep behaviour tests.
pub struct OverdueWorld {
    pub service: TestTaskService,
    pub queue: Arc<InMemoryStatusChangeQueue>,
    pub relay: OutboxRelay<InMemoryTaskStore, DefaultClock>,
    pub sweeper: OverdueSweeper<InMemoryTaskStore>,
    pub worker: StatusChangeWorker<InMemoryTaskStore, DefaultClock>,
    pub owner: String,
    pub now: DateTime<Utc>,
    pub tasks: HashMap<String, Task>,
    pub last_sweep: Option<SweepReport>,
}

impl OverdueWorld {
    /// Creates a world with an empty store and queue.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(InMemoryStatusChangeQueue::new());
        let shared_queue: Arc<dyn StatusChangeQueue> = queue.clone();
        let clock = Arc::new(DefaultClock);
        let service = TaskService::new(Arc::clone(&store), Arc::clone(&clock));

        Self {
            relay: OutboxRelay::new(Arc::clone(&store), Arc::clone(&shared_queue), clock),
            sweeper: OverdueSweeper::new(store, Arc::clone(&shared_queue)),
            worker: StatusChangeWorker::new(service.clone(), shared_queue),
            service,
            queue,
            owner: Uuid::new_v4().to_string(),
            now: Utc::now(),
            tasks: HashMap::new(),
            last_sweep: None,
        }
    }

    /// Returns the id of the task created under `title`.
    ///
    /// # Errors
    ///
    /// Returns an error when no task with that title was created.
    pub fn task_id(&self, title: &str) -> Result<TaskId, eyre::Report> {
        self.tasks
            .get(title)
            .map(Task::id)
            .ok_or_else(|| eyre::eyre!("no task titled {title:?} in scenario world"))
    }
}

impl Default for OverdueWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> OverdueWorld {
    OverdueWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
