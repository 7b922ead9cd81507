//! Task store port: persistence, filtered lookup, batch updates and purge.

use crate::task::domain::{Task, TaskFilter, TaskId, TaskStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Page of tasks returned by a filtered query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPage {
    /// Matching tasks ordered by creation time, capped by the filter limit.
    pub items: Vec<Task>,
    /// Number of matching tasks before the limit was applied.
    pub total: usize,
}

/// Task persistence contract.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores a new task and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the task ID already
    /// exists, or [`TaskStoreError::Persistence`] on backend failure.
    async fn add(&self, task: &Task) -> TaskStoreResult<Task>;

    /// Returns tasks matching `filter`, oldest first.
    async fn get_all(&self, filter: &TaskFilter) -> TaskStoreResult<TaskPage>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>>;

    /// Persists changes to an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    async fn update(&self, task: &Task) -> TaskStoreResult<()>;

    /// Persists changes to several tasks atomically.
    ///
    /// Either every task is written or none is.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when any task does not exist.
    async fn update_batch(&self, tasks: &[Task]) -> TaskStoreResult<()>;

    /// Persists several tasks in one transaction, each only while its stored
    /// status still equals the status paired with it.
    ///
    /// Tasks that moved on, or were deleted, since they were read are skipped.
    /// Returns the identifiers that were written.
    async fn update_batch_if_status(
        &self,
        batch: &[(Task, TaskStatus)],
    ) -> TaskStoreResult<Vec<TaskId>>;

    /// Deletes tasks by identifier, returning the number removed.
    ///
    /// Unknown identifiers are ignored.
    async fn delete(&self, ids: &[TaskId]) -> TaskStoreResult<usize>;

    /// Returns `true` when [`TaskStore::bulk_delete`] is available.
    fn supports_bulk_delete(&self) -> bool {
        false
    }

    /// Deletes every task matching `filter` in one conditional statement.
    ///
    /// The filter limit is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unsupported`] unless the store advertises
    /// bulk deletion.
    async fn bulk_delete(&self, filter: &TaskFilter) -> TaskStoreResult<usize> {
        let _ = filter;
        Err(TaskStoreError::Unsupported("bulk delete"))
    }
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The store does not implement an optional operation.
    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    #[must_use]
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
