//! Bulk operations over sets of tasks.

use super::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bulk action accepted by batch processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    /// Mark every named task as completed.
    Complete,
    /// Delete every named task.
    Delete,
}

impl BatchAction {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Delete => "delete",
        }
    }

    /// Parses a wire action name. Returns `None` for anything unsupported.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "complete" => Some(Self::Complete),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a batch operation.
///
/// `affected` counts matched tasks only; ids with no stored task are
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Action that ran.
    pub action: BatchAction,
    /// Number of ids named in the request.
    pub requested: usize,
    /// Number of stored tasks the action touched.
    pub affected: u64,
}

/// Deduplicates ids while keeping first-seen order.
#[must_use]
pub fn distinct_ids(ids: impl IntoIterator<Item = TaskId>) -> Vec<TaskId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
