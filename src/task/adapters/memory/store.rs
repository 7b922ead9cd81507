//! In-memory task store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{Task, TaskFilter, TaskId, TaskStatus},
    ports::{TaskPage, TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store.
///
/// Bulk deletion is disabled by default so the fetch-then-delete purge path
/// is exercised; [`InMemoryTaskStore::with_bulk_delete`] enables it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    bulk_delete: bool,
}

impl InMemoryTaskStore {
    /// Creates an empty store without bulk deletion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that advertises bulk deletion.
    #[must_use]
    pub fn with_bulk_delete() -> Self {
        Self {
            bulk_delete: true,
            ..Self::default()
        }
    }

    /// Returns the number of stored tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn len(&self) -> TaskStoreResult<usize> {
        Ok(self.read()?.len())
    }

    /// Returns `true` when the store holds no tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn is_empty(&self) -> TaskStoreResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> TaskStoreResult<std::sync::RwLockReadGuard<'_, HashMap<TaskId, Task>>> {
        self.tasks
            .read()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> TaskStoreResult<std::sync::RwLockWriteGuard<'_, HashMap<TaskId, Task>>> {
        self.tasks
            .write()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

/// Collects matching tasks ordered by creation time, then id.
fn matching(tasks: &HashMap<TaskId, Task>, filter: &TaskFilter) -> Vec<Task> {
    let mut found: Vec<Task> = tasks
        .values()
        .filter(|task| filter.matches(task))
        .cloned()
        .collect();
    found.sort_by_key(|task| (task.date_added(), task.id()));
    found
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn add(&self, task: &Task) -> TaskStoreResult<Task> {
        let mut tasks = self.write()?;
        if tasks.contains_key(&task.id()) {
            return Err(TaskStoreError::DuplicateTask(task.id()));
        }
        tasks.insert(task.id(), task.clone());
        Ok(task.clone())
    }

    async fn get_all(&self, filter: &TaskFilter) -> TaskStoreResult<TaskPage> {
        let tasks = self.read()?;
        let mut items = matching(&tasks, filter);
        let total = items.len();
        if let Some(limit) = filter.limit() {
            items.truncate(limit);
        }
        Ok(TaskPage { items, total })
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> TaskStoreResult<()> {
        let mut tasks = self.write()?;
        let slot = tasks
            .get_mut(&task.id())
            .ok_or(TaskStoreError::NotFound(task.id()))?;
        *slot = task.clone();
        Ok(())
    }

    async fn update_batch(&self, batch: &[Task]) -> TaskStoreResult<()> {
        let mut tasks = self.write()?;
        // Validate the whole batch before writing so a miss leaves no partial update.
        if let Some(missing) = batch.iter().find(|task| !tasks.contains_key(&task.id())) {
            return Err(TaskStoreError::NotFound(missing.id()));
        }
        for task in batch {
            tasks.insert(task.id(), task.clone());
        }
        Ok(())
    }

    async fn update_batch_if_status(
        &self,
        batch: &[(Task, TaskStatus)],
    ) -> TaskStoreResult<Vec<TaskId>> {
        let mut tasks = self.write()?;
        let mut written = Vec::with_capacity(batch.len());
        for (task, expected) in batch {
            if let Some(slot) = tasks
                .get_mut(&task.id())
                .filter(|stored| stored.status() == *expected)
            {
                *slot = task.clone();
                written.push(task.id());
            }
        }
        Ok(written)
    }

    async fn delete(&self, ids: &[TaskId]) -> TaskStoreResult<usize> {
        let mut tasks = self.write()?;
        Ok(ids.iter().filter(|id| tasks.remove(*id).is_some()).count())
    }

    fn supports_bulk_delete(&self) -> bool {
        self.bulk_delete
    }

    async fn bulk_delete(&self, filter: &TaskFilter) -> TaskStoreResult<usize> {
        if !self.bulk_delete {
            return Err(TaskStoreError::Unsupported("bulk delete"));
        }
        let mut tasks = self.write()?;
        let before = tasks.len();
        tasks.retain(|_, task| !filter.matches(task));
        Ok(before - tasks.len())
    }
}
