//! Shared wiring for pipeline integration tests.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use rstest::fixture;
use taskrelay::{
    pipeline::{OutboxRelay, OverdueSweeper, StatusChangeWorker},
    queue::{adapters::memory::InMemoryStatusChangeQueue, domain::DeliveryPolicy},
    queue::ports::StatusChangeQueue,
    task::{
        adapters::memory::InMemoryTaskStore,
        domain::{Task, TaskId, TaskStatus},
        services::{CreateTaskRequest, TaskService},
    },
};
use uuid::Uuid;

/// Service type wired to the in-memory store.
pub type TestService = TaskService<InMemoryTaskStore, DefaultClock>;

/// How long a drain may take before a test gives up.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Store, queue, and every pipeline stage wired together in-process.
pub struct Pipeline {
    pub store: Arc<InMemoryTaskStore>,
    pub queue: Arc<InMemoryStatusChangeQueue>,
    pub service: TestService,
    pub relay: OutboxRelay<InMemoryTaskStore, DefaultClock>,
    pub sweeper: OverdueSweeper<InMemoryTaskStore>,
    pub worker: StatusChangeWorker<InMemoryTaskStore, DefaultClock>,
    pub owner: String,
}

impl Pipeline {
    /// Wires a pipeline whose queue uses `policy`.
    #[must_use]
    pub fn with_policy(policy: DeliveryPolicy) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(InMemoryStatusChangeQueue::with_policy(policy));
        let clock = Arc::new(DefaultClock);
        let service = TaskService::new(Arc::clone(&store), Arc::clone(&clock));
        let shared_queue: Arc<dyn StatusChangeQueue> = queue.clone();
        Self {
            relay: OutboxRelay::new(Arc::clone(&store), Arc::clone(&shared_queue), clock),
            sweeper: OverdueSweeper::new(Arc::clone(&store), Arc::clone(&shared_queue)),
            worker: StatusChangeWorker::new(service.clone(), shared_queue),
            store,
            queue,
            service,
            owner: Uuid::new_v4().to_string(),
        }
    }

    /// Creates a task owned by the pipeline's owner.
    pub async fn create(&self, request: CreateTaskRequest) -> Task {
        self.service.create(request).await.expect("task creation should succeed")
    }

    /// Starts a creation request owned by the pipeline's owner.
    #[must_use]
    pub fn request(&self, title: &str) -> CreateTaskRequest {
        CreateTaskRequest::new(title, self.owner.clone())
    }

    /// Processes deliveries until nothing is outstanding.
    pub async fn drain(&self) {
        tokio::time::timeout(DRAIN_TIMEOUT, async {
            while self.queue.counts().await.expect("counts").outstanding() > 0 {
                self.worker
                    .run_once()
                    .await
                    .expect("delivery settles")
                    .expect("queue is open");
            }
        })
        .await
        .expect("queue drains");
    }

    /// Returns the stored status of `id`.
    pub async fn status_of(&self, id: TaskId) -> TaskStatus {
        self.service
            .find_one(id)
            .await
            .expect("task should exist")
            .status()
    }
}

/// Provides a pipeline with the default delivery policy.
#[fixture]
pub fn pipeline() -> Pipeline {
    Pipeline::with_policy(DeliveryPolicy::default())
}
