//! Listing filters, pagination, and aggregate statistics.

use super::{OwnerId, Task, TaskDomainError, TaskPriority, TaskStatus};
use serde::{Deserialize, Serialize};

/// Conjunctive filter over task listings. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Restrict to this status.
    pub status: Option<TaskStatus>,
    /// Restrict to this priority.
    pub priority: Option<TaskPriority>,
    /// Restrict to tasks owned by this user.
    pub owner_id: Option<OwnerId>,
}

impl TaskFilter {
    /// Restricts the filter to `status`.
    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts the filter to `priority`.
    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Restricts the filter to tasks owned by `owner_id`.
    #[must_use]
    pub const fn with_owner_id(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Returns whether `task` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status() == status)
            && self.priority.is_none_or(|priority| task.priority() == priority)
            && self.owner_id.is_none_or(|owner| task.owner_id() == owner)
    }
}

/// Validated page selection. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Page returned when none is requested.
    pub const DEFAULT_PAGE: u32 = 1;
    /// Page size used when none is requested.
    pub const DEFAULT_LIMIT: u32 = 10;
    /// Largest page size accepted.
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a page request, falling back to the defaults for missing
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidPage`] for page zero and
    /// [`TaskDomainError::InvalidLimit`] when the limit is zero or above
    /// [`Self::MAX_LIMIT`].
    pub const fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self, TaskDomainError> {
        let resolved_page = match page {
            Some(value) => value,
            None => Self::DEFAULT_PAGE,
        };
        let resolved_limit = match limit {
            Some(value) => value,
            None => Self::DEFAULT_LIMIT,
        };
        if resolved_page == 0 {
            return Err(TaskDomainError::InvalidPage(resolved_page));
        }
        if resolved_limit == 0 || resolved_limit > Self::MAX_LIMIT {
            return Err(TaskDomainError::InvalidLimit {
                limit: resolved_limit,
                max: Self::MAX_LIMIT,
            });
        }
        Ok(Self {
            page: resolved_page,
            limit: resolved_limit,
        })
    }

    /// Returns the 1-based page number.
    #[must_use]
    pub const fn page(self) -> u32 {
        self.page
    }

    /// Returns the page size.
    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    /// Returns the number of items preceding this page.
    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of a filtered task listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    /// Tasks on this page, in listing order.
    pub items: Vec<Task>,
    /// Number of tasks matching the filter across all pages.
    pub total: u64,
    /// The 1-based page number served.
    pub page: u32,
    /// The page size used.
    pub limit: u32,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
}

impl TaskPage {
    /// Assembles a page and derives its page count.
    #[must_use]
    pub fn new(items: Vec<Task>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            limit: request.limit(),
            total_pages: total.div_ceil(u64::from(request.limit())),
        }
    }
}

/// Aggregate task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    /// All matching tasks.
    pub total: u64,
    /// Tasks with status `COMPLETED`.
    pub completed: u64,
    /// Tasks with status `IN_PROGRESS`.
    pub in_progress: u64,
    /// Tasks with status `PENDING`.
    pub pending: u64,
    /// Tasks with priority `HIGH`.
    pub high_priority: u64,
}

impl TaskStatistics {
    /// Counts `task` into the running totals.
    pub fn record(&mut self, task: &Task) {
        self.total += 1;
        match task.status() {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Overdue => {}
        }
        if task.priority() == TaskPriority::High {
            self.high_priority += 1;
        }
    }
}
