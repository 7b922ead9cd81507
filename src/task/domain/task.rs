//! Task aggregate root.

use super::{TaskDomainError, TaskId, TaskKind, TaskStatus, TaskTypeName, UserId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    task_type: TaskTypeName,
    status: TaskStatus,
    date_added: DateTime<Utc>,
    date_updated: DateTime<Utc>,
    last_activity_date: Option<DateTime<Utc>>,
    execute_date_start: Option<DateTime<Utc>>,
    execute_date_end: Option<DateTime<Utc>>,
    parent_id: Option<TaskId>,
    user_id: Option<UserId>,
    config: Value,
    result: Option<Value>,
    error_message: Option<String>,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted type discriminator.
    pub task_type: TaskTypeName,
    /// Persisted lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub date_added: DateTime<Utc>,
    /// Latest modification timestamp.
    pub date_updated: DateTime<Utc>,
    /// Latest executor heartbeat, if any.
    pub last_activity_date: Option<DateTime<Utc>>,
    /// Execution start, if started.
    pub execute_date_start: Option<DateTime<Utc>>,
    /// Execution end, if finished.
    pub execute_date_end: Option<DateTime<Utc>>,
    /// Parent task back-reference.
    pub parent_id: Option<TaskId>,
    /// Attributed user.
    pub user_id: Option<UserId>,
    /// Opaque input payload.
    pub config: Value,
    /// Opaque output payload.
    pub result: Option<Value>,
    /// Failure diagnostic.
    pub error_message: Option<String>,
}

impl Task {
    /// Creates a new waiting task with an untyped config payload.
    #[must_use]
    pub fn new(task_type: TaskTypeName, config: Value, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::new(),
            task_type,
            status: TaskStatus::Wait,
            date_added: timestamp,
            date_updated: timestamp,
            last_activity_date: None,
            execute_date_start: None,
            execute_date_end: None,
            parent_id: None,
            user_id: None,
            config,
            result: None,
            error_message: None,
        }
    }

    /// Creates a new waiting task of kind `K`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::MalformedPayload`] when the config cannot be
    /// serialised, or [`TaskDomainError::InvalidTaskType`] when the kind's
    /// type name is invalid.
    pub fn of<K: TaskKind>(config: &K::Config, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let task_type = K::type_name()?;
        let value = serde_json::to_value(config)
            .map_err(|err| TaskDomainError::malformed(K::TYPE_NAME, &err))?;
        Ok(Self::new(task_type, value, clock))
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            task_type: data.task_type,
            status: data.status,
            date_added: data.date_added,
            date_updated: data.date_updated,
            last_activity_date: data.last_activity_date,
            execute_date_start: data.execute_date_start,
            execute_date_end: data.execute_date_end,
            parent_id: data.parent_id,
            user_id: data.user_id,
            config: data.config,
            result: data.result,
            error_message: data.error_message,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the type discriminator.
    #[must_use]
    pub const fn task_type(&self) -> &TaskTypeName {
        &self.task_type
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn date_added(&self) -> DateTime<Utc> {
        self.date_added
    }

    /// Returns the latest modification timestamp.
    #[must_use]
    pub const fn date_updated(&self) -> DateTime<Utc> {
        self.date_updated
    }

    /// Returns the latest executor heartbeat.
    #[must_use]
    pub const fn last_activity_date(&self) -> Option<DateTime<Utc>> {
        self.last_activity_date
    }

    /// Returns the execution start timestamp.
    #[must_use]
    pub const fn execute_date_start(&self) -> Option<DateTime<Utc>> {
        self.execute_date_start
    }

    /// Returns the execution end timestamp.
    #[must_use]
    pub const fn execute_date_end(&self) -> Option<DateTime<Utc>> {
        self.execute_date_end
    }

    /// Returns the parent task identifier.
    #[must_use]
    pub const fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    /// Returns the attributed user.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Returns the raw config payload.
    #[must_use]
    pub const fn config(&self) -> &Value {
        &self.config
    }

    /// Returns the raw result payload.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the failure diagnostic, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Deserialises the config payload as kind `K`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskTypeMismatch`] when the task is not of
    /// kind `K`, or [`TaskDomainError::MalformedPayload`] when the stored JSON
    /// does not match `K::Config`.
    pub fn config_as<K: TaskKind>(&self) -> Result<K::Config, TaskDomainError> {
        self.ensure_kind::<K>()?;
        serde_json::from_value(self.config.clone())
            .map_err(|err| TaskDomainError::malformed(K::TYPE_NAME, &err))
    }

    /// Deserialises the result payload as kind `K`.
    ///
    /// Returns `Ok(None)` while no result has been written.
    ///
    /// # Errors
    ///
    /// Same as [`Task::config_as`].
    pub fn result_as<K: TaskKind>(&self) -> Result<Option<K::Output>, TaskDomainError> {
        self.ensure_kind::<K>()?;
        self.result
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| TaskDomainError::malformed(K::TYPE_NAME, &err))
    }

    /// Attaches parent and user attribution.
    ///
    /// Only provided values are written; existing attribution is otherwise
    /// kept.
    pub fn assign_lineage(&mut self, parent_id: Option<TaskId>, user_id: Option<UserId>) {
        if parent_id.is_some() {
            self.parent_id = parent_id;
        }
        if user_id.is_some() {
            self.user_id = user_id;
        }
    }

    /// Moves the task to `target` when the state machine allows it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the move is
    /// not permitted. The task is left unchanged.
    pub fn transition_to(
        &mut self,
        target: TaskStatus,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.touch(clock);
        Ok(())
    }

    /// Claims a waiting task for execution.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// waiting.
    pub fn start(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::InProgress, clock)?;
        self.execute_date_start = Some(self.date_updated);
        self.last_activity_date = Some(self.date_updated);
        Ok(())
    }

    /// Refreshes the executor heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// in progress.
    pub fn record_activity(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if self.status != TaskStatus::InProgress {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to: TaskStatus::InProgress,
            });
        }
        self.touch(clock);
        self.last_activity_date = Some(self.date_updated);
        Ok(())
    }

    /// Finishes a running task with a terminal status and its result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// in progress and `status` is terminal.
    pub fn complete(
        &mut self,
        status: TaskStatus,
        result: Value,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.status != TaskStatus::InProgress || !status.is_terminal() {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to: status,
            });
        }
        self.transition_to(status, clock)?;
        self.result = Some(result);
        self.execute_date_end = Some(self.date_updated);
        Ok(())
    }

    /// Finishes a running task with a typed result of kind `K`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Task::complete`], plus
    /// [`TaskDomainError::TaskTypeMismatch`] and
    /// [`TaskDomainError::MalformedPayload`].
    pub fn complete_with<K: TaskKind>(
        &mut self,
        status: TaskStatus,
        output: &K::Output,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.ensure_kind::<K>()?;
        let value = serde_json::to_value(output)
            .map_err(|err| TaskDomainError::malformed(K::TYPE_NAME, &err))?;
        self.complete(status, value, clock)
    }

    /// Marks a non-terminal task as failed with a diagnostic message.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the task is
    /// already terminal.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::Fails, clock)?;
        self.error_message = Some(message.into());
        self.execute_date_end = Some(self.date_updated);
        Ok(())
    }

    fn ensure_kind<K: TaskKind>(&self) -> Result<(), TaskDomainError> {
        if self.task_type.as_str() == K::TYPE_NAME {
            return Ok(());
        }
        Err(TaskDomainError::TaskTypeMismatch {
            task_id: self.id,
            expected: K::TYPE_NAME.to_owned(),
            actual: self.task_type.as_str().to_owned(),
        })
    }

    /// Updates the `date_updated` timestamp to the current clock time.
    fn touch(&mut self, clock: &impl Clock) {
        self.date_updated = clock.utc();
    }
}
