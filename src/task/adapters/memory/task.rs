//! In-memory task store for tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        OutboxEntry, OutboxId, OwnerId, PageRequest, Task, TaskFilter, TaskId, TaskPage,
        TaskRevision, TaskStatistics, TaskStatus,
    },
    ports::{TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store.
///
/// A single lock guards tasks and outbox together, so each operation is
/// atomic with respect to every other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, Task>,
    /// Unpublished announcements in write order. Published ones are dropped.
    outbox: Vec<OutboxEntry>,
}

impl InMemoryTaskStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn retained_outbox_len(&self) -> TaskStoreResult<usize> {
        Ok(self.read()?.outbox.len())
    }

    fn read(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state
            .read()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state
            .write()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl InMemoryTaskState {
    fn record(&mut self, announcement: Option<&OutboxEntry>) {
        if let Some(entry) = announcement {
            self.outbox.push(entry.clone());
        }
    }

    fn drop_pending_for(&mut self, id: TaskId) {
        self.outbox.retain(|entry| entry.event().task_id != id);
    }

    fn sorted_matching(&self, filter: &TaskFilter) -> Vec<&Task> {
        let mut matching: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| filter.matches(task))
            .collect();
        matching.sort_by_key(|task| (task.created_at(), task.id()));
        matching
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(
        &self,
        task: &Task,
        announcement: Option<&OutboxEntry>,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskStoreError::DuplicateTask(task.id()));
        }
        state.tasks.insert(task.id(), task.clone());
        state.record(announcement);
        Ok(())
    }

    async fn save(
        &self,
        task: &Task,
        expected: TaskRevision,
        announcement: Option<&OutboxEntry>,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        let stored = state
            .tasks
            .get(&task.id())
            .ok_or(TaskStoreError::NotFound(task.id()))?;
        if stored.revision() != expected {
            return Err(TaskStoreError::RevisionConflict {
                id: task.id(),
                expected,
                actual: stored.revision(),
            });
        }
        state.tasks.insert(task.id(), task.clone());
        state.record(announcement);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state
            .tasks
            .remove(&id)
            .ok_or(TaskStoreError::NotFound(id))?;
        state.drop_pending_for(id);
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_page(&self, filter: &TaskFilter, page: PageRequest) -> TaskStoreResult<TaskPage> {
        let state = self.read()?;
        let matching = state.sorted_matching(filter);
        let total = u64::try_from(matching.len()).map_err(TaskStoreError::persistence)?;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(TaskPage::new(items, total, page))
    }

    async fn aggregate_stats(&self, owner_id: Option<OwnerId>) -> TaskStoreResult<TaskStatistics> {
        let state = self.read()?;
        let mut stats = TaskStatistics::default();
        state
            .tasks
            .values()
            .filter(|task| owner_id.is_none_or(|owner| task.owner_id() == owner))
            .for_each(|task| stats.record(task));
        Ok(stats)
    }

    async fn batch_set_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> TaskStoreResult<u64> {
        let mut state = self.write()?;
        let mut affected = 0;
        for id in distinct(ids) {
            if let Some(task) = state.tasks.get_mut(&id) {
                task.force_status(status, at);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn batch_delete(&self, ids: &[TaskId]) -> TaskStoreResult<u64> {
        let mut state = self.write()?;
        let mut affected = 0;
        for id in distinct(ids) {
            if state.tasks.remove(&id).is_some() {
                state.drop_pending_for(id);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        let mut overdue: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.is_overdue_at(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|task| (task.created_at(), task.id()));
        Ok(overdue)
    }

    async fn pending_outbox(&self, limit: usize) -> TaskStoreResult<Vec<OutboxEntry>> {
        let state = self.read()?;
        Ok(state.outbox.iter().take(limit).cloned().collect())
    }

    async fn mark_published(&self, ids: &[OutboxId], _at: DateTime<Utc>) -> TaskStoreResult<u64> {
        let mut state = self.write()?;
        let before = state.outbox.len();
        state.outbox.retain(|entry| !ids.contains(&entry.id()));
        u64::try_from(before.saturating_sub(state.outbox.len())).map_err(TaskStoreError::persistence)
    }
}

/// Yields each id once, keeping first-seen order.
fn distinct(ids: &[TaskId]) -> Vec<TaskId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
