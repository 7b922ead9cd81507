//! Process-wide task type registry.
//!
//! The registry is built once at startup from explicit
//! [`TaskTypeRegistration`] values and shared read-only afterwards.

use super::{Task, TaskDomainError, TaskKind, TaskTypeName};
use serde_json::Value;
use std::collections::BTreeMap;

/// Derives the message-bus key for a task event.
pub type EventKeyFn = fn(&Task) -> String;

type ConfigValidator = fn(&Value) -> Result<(), String>;

fn task_id_key(task: &Task) -> String {
    task.id().to_string()
}

fn accept_any(_: &Value) -> Result<(), String> {
    Ok(())
}

fn validate_as<K: TaskKind>(config: &Value) -> Result<(), String> {
    serde_json::from_value::<K::Config>(config.clone())
        .map(|_| ())
        .map_err(|err| err.to_string())
}

/// Routing and payload metadata for one task kind.
#[derive(Debug, Clone)]
pub struct TaskTypeRegistration {
    name: TaskTypeName,
    topic_suffix: String,
    executors: Vec<String>,
    key_fn: EventKeyFn,
    validator: ConfigValidator,
}

impl TaskTypeRegistration {
    /// Creates a registration for kind `K`.
    ///
    /// The topic suffix defaults to the type name, the event key to the task
    /// id, and no executors are declared.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskType`] when the kind's type name
    /// is invalid.
    pub fn of<K: TaskKind>() -> Result<Self, TaskDomainError> {
        let name = K::type_name()?;
        Ok(Self {
            topic_suffix: name.as_str().to_owned(),
            name,
            executors: Vec::new(),
            key_fn: task_id_key,
            validator: validate_as::<K>,
        })
    }

    /// Creates a registration known only by name.
    ///
    /// Any JSON configuration is accepted. Used by hosts that route events
    /// for kinds they do not link, such as the maintenance service.
    #[must_use]
    pub fn untyped(name: TaskTypeName) -> Self {
        Self {
            topic_suffix: name.as_str().to_owned(),
            name,
            executors: Vec::new(),
            key_fn: task_id_key,
            validator: accept_any,
        }
    }

    /// Overrides the topic suffix.
    #[must_use]
    pub fn with_topic_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.topic_suffix = suffix.into();
        self
    }

    /// Declares an executor that consumes this type's topic.
    #[must_use]
    pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
        self.executors.push(executor.into());
        self
    }

    /// Overrides the event key derivation.
    #[must_use]
    pub const fn with_key_fn(mut self, key_fn: EventKeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    /// Returns the registered type name.
    #[must_use]
    pub const fn name(&self) -> &TaskTypeName {
        &self.name
    }

    /// Returns the configured topic suffix.
    #[must_use]
    pub fn topic_suffix(&self) -> &str {
        &self.topic_suffix
    }

    /// Returns the declared executor identities.
    #[must_use]
    pub fn executors(&self) -> &[String] {
        &self.executors
    }

    /// Derives the bus key for `task`.
    #[must_use]
    pub fn event_key(&self, task: &Task) -> String {
        (self.key_fn)(task)
    }

    /// Checks that `config` deserialises as this kind's config type.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::MalformedPayload`] on mismatch.
    pub fn validate_config(&self, config: &Value) -> Result<(), TaskDomainError> {
        (self.validator)(config).map_err(|message| TaskDomainError::MalformedPayload {
            task_type: self.name.as_str().to_owned(),
            message,
        })
    }
}

/// Registry of every task kind the application declares.
#[derive(Debug, Clone, Default)]
pub struct TaskTypeRegistry {
    entries: BTreeMap<TaskTypeName, TaskTypeRegistration>,
}

impl TaskTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::DuplicateRegistration`] when the type is
    /// already registered.
    pub fn register(&mut self, registration: TaskTypeRegistration) -> Result<(), TaskDomainError> {
        if self.entries.contains_key(registration.name()) {
            return Err(TaskDomainError::DuplicateRegistration(
                registration.name().as_str().to_owned(),
            ));
        }
        self.entries
            .insert(registration.name().clone(), registration);
        Ok(())
    }

    /// Builder-style variant of [`TaskTypeRegistry::register`].
    ///
    /// # Errors
    ///
    /// Same as [`TaskTypeRegistry::register`].
    pub fn with(mut self, registration: TaskTypeRegistration) -> Result<Self, TaskDomainError> {
        self.register(registration)?;
        Ok(self)
    }

    /// Looks up a registration by type name.
    #[must_use]
    pub fn get(&self, task_type: &TaskTypeName) -> Option<&TaskTypeRegistration> {
        self.entries.get(task_type)
    }

    /// Returns `true` when the type is registered.
    #[must_use]
    pub fn contains(&self, task_type: &TaskTypeName) -> bool {
        self.entries.contains_key(task_type)
    }

    /// Iterates registrations in type-name order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskTypeRegistration> {
        self.entries.values()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
