//! Facade for creating tasks and walking task hierarchies.

use super::dispatcher::{DispatchError, TaskDispatch};
use crate::task::{
    domain::{
        Task, TaskDomainError, TaskFilter, TaskId, TaskStatus, TaskTypeName, TaskTypeRegistry,
        UserId,
    },
    ports::{TaskStore, TaskStoreError, TaskStoreResult},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned by [`TaskManager::run`].
///
/// Each variant names the step that failed: validation, persistence or
/// dispatch.
#[derive(Debug, Error)]
pub enum TaskRunError {
    /// The task type is not registered.
    #[error("task type '{0}' is not registered")]
    UnknownType(TaskTypeName),

    /// The config payload does not match the registered kind.
    #[error("invalid task config: {0}")]
    InvalidConfig(#[source] TaskDomainError),

    /// Only waiting tasks can be run.
    #[error("task {task_id} is {status}, only waiting tasks can be run")]
    NotRunnable {
        /// Rejected task.
        task_id: TaskId,
        /// Its current status.
        status: TaskStatus,
    },

    /// The store rejected the task. The store's message is kept verbatim.
    #[error(transparent)]
    Persistence(#[from] TaskStoreError),

    /// The task was persisted but its event was not published.
    #[error("task {task_id} was persisted but could not be dispatched: {source}")]
    Dispatch {
        /// Persisted task.
        task_id: TaskId,
        /// Dispatcher failure.
        #[source]
        source: DispatchError,
    },
}

/// Result type for task manager operations.
pub type TaskRunResult<T> = Result<T, TaskRunError>;

/// Entry point used by callers and schedulers to run tasks.
pub struct TaskManager<S, D>
where
    S: TaskStore,
    D: TaskDispatch,
{
    store: Arc<S>,
    dispatcher: Arc<D>,
    registry: Arc<TaskTypeRegistry>,
}

impl<S, D> Clone for TaskManager<S, D>
where
    S: TaskStore,
    D: TaskDispatch,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S, D> TaskManager<S, D>
where
    S: TaskStore,
    D: TaskDispatch,
{
    /// Creates a manager.
    #[must_use]
    pub const fn new(store: Arc<S>, dispatcher: Arc<D>, registry: Arc<TaskTypeRegistry>) -> Self {
        Self {
            store,
            dispatcher,
            registry,
        }
    }

    /// Attributes, persists and dispatches a waiting task.
    ///
    /// Success means the task is stored and its event was acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRunError::UnknownType`], [`TaskRunError::InvalidConfig`]
    /// or [`TaskRunError::NotRunnable`] before anything is written,
    /// [`TaskRunError::Persistence`] when the store rejects the task, and
    /// [`TaskRunError::Dispatch`] when the stored task could not be published.
    pub async fn run(
        &self,
        mut task: Task,
        parent_id: Option<TaskId>,
        user_id: Option<UserId>,
    ) -> TaskRunResult<Task> {
        let registration = self
            .registry
            .get(task.task_type())
            .ok_or_else(|| TaskRunError::UnknownType(task.task_type().clone()))?;
        registration
            .validate_config(task.config())
            .map_err(TaskRunError::InvalidConfig)?;
        if task.status() != TaskStatus::Wait {
            return Err(TaskRunError::NotRunnable {
                task_id: task.id(),
                status: task.status(),
            });
        }

        task.assign_lineage(parent_id, user_id);
        let stored = self.store.add(&task).await?;

        if let Err(source) = self.dispatcher.dispatch(&stored).await {
            warn!(
                task_id = %stored.id(),
                task_type = %stored.task_type(),
                error = %source,
                "task persisted but not dispatched"
            );
            return Err(TaskRunError::Dispatch {
                task_id: stored.id(),
                source,
            });
        }
        info!(task_id = %stored.id(), task_type = %stored.task_type(), "task started");
        Ok(stored)
    }

    /// Loads a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError`] on backend failure.
    pub async fn get_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.store.find_by_id(id).await
    }

    /// Loads the parent of `task`.
    ///
    /// Returns `Ok(None)` without touching the store when the task has no
    /// parent.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError`] on backend failure.
    pub async fn get_parent(&self, task: &Task) -> TaskStoreResult<Option<Task>> {
        let Some(parent_id) = task.parent_id() else {
            return Ok(None);
        };
        self.store.find_by_id(parent_id).await
    }

    /// Loads every child of `parent_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError`] on backend failure.
    pub async fn get_children(&self, parent_id: TaskId) -> TaskStoreResult<Vec<Task>> {
        let page = self
            .store
            .get_all(&TaskFilter::new().with_parent(parent_id))
            .await?;
        Ok(page.items)
    }
}
