//! Store-agnostic task query predicate.

use super::{Task, TaskId, TaskStatus, TaskTypeName};
use chrono::{DateTime, Utc};

/// Conjunctive predicate over task records.
///
/// Every populated criterion must hold for a task to match; empty criteria
/// match everything. Adapters translate the predicate into their native query
/// language and must agree with [`TaskFilter::matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    statuses: Vec<TaskStatus>,
    include_types: Vec<TaskTypeName>,
    exclude_types: Vec<TaskTypeName>,
    added_before: Option<DateTime<Utc>>,
    last_activity_before: Option<DateTime<Utc>>,
    parent_id: Option<TaskId>,
    limit: Option<usize>,
}

impl TaskFilter {
    /// Creates a filter matching every task.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts matches to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Restricts matches to the given task types.
    #[must_use]
    pub fn including_types(mut self, types: impl IntoIterator<Item = TaskTypeName>) -> Self {
        self.include_types = types.into_iter().collect();
        self
    }

    /// Excludes the given task types.
    #[must_use]
    pub fn excluding_types(mut self, types: impl IntoIterator<Item = TaskTypeName>) -> Self {
        self.exclude_types = types.into_iter().collect();
        self
    }

    /// Matches tasks added strictly before `instant`.
    #[must_use]
    pub const fn added_before(mut self, instant: DateTime<Utc>) -> Self {
        self.added_before = Some(instant);
        self
    }

    /// Matches tasks whose last heartbeat is strictly before `instant`.
    ///
    /// Tasks without a heartbeat never match this criterion.
    #[must_use]
    pub const fn last_activity_before(mut self, instant: DateTime<Utc>) -> Self {
        self.last_activity_before = Some(instant);
        self
    }

    /// Matches children of `parent_id`.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Caps the number of returned items. The reported total is unaffected.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the status criterion.
    #[must_use]
    pub fn statuses(&self) -> &[TaskStatus] {
        &self.statuses
    }

    /// Returns the included types.
    #[must_use]
    pub fn include_types(&self) -> &[TaskTypeName] {
        &self.include_types
    }

    /// Returns the excluded types.
    #[must_use]
    pub fn exclude_types(&self) -> &[TaskTypeName] {
        &self.exclude_types
    }

    /// Returns the creation cut-off.
    #[must_use]
    pub const fn added_before_instant(&self) -> Option<DateTime<Utc>> {
        self.added_before
    }

    /// Returns the heartbeat cut-off.
    #[must_use]
    pub const fn last_activity_before_instant(&self) -> Option<DateTime<Utc>> {
        self.last_activity_before
    }

    /// Returns the parent criterion.
    #[must_use]
    pub const fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    /// Returns the item cap.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Evaluates the predicate against a task.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&task.status());
        let include_ok =
            self.include_types.is_empty() || self.include_types.contains(task.task_type());
        let exclude_ok = !self.exclude_types.contains(task.task_type());
        let added_ok = self
            .added_before
            .is_none_or(|cutoff| task.date_added() < cutoff);
        let activity_ok = self.last_activity_before.is_none_or(|cutoff| {
            task.last_activity_date()
                .is_some_and(|last_activity| last_activity < cutoff)
        });
        let parent_ok = self
            .parent_id
            .is_none_or(|parent| task.parent_id() == Some(parent));

        status_ok && include_ok && exclude_ok && added_ok && activity_ok && parent_ok
    }
}
