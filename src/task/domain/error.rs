//! Error types for task domain validation and parsing.

use super::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task type name is empty or contains whitespace.
    #[error("invalid task type name '{0}'")]
    InvalidTaskType(String),

    /// The task type was registered twice.
    #[error("task type '{0}' is already registered")]
    DuplicateRegistration(String),

    /// The user identifier is empty after trimming.
    #[error("user identifier must not be empty")]
    EmptyUserId,

    /// The requested status change is not permitted by the state machine.
    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// A payload was read through a task kind that does not match the task.
    #[error("task {task_id} has type '{actual}', not '{expected}'")]
    TaskTypeMismatch {
        /// Task whose payload was requested.
        task_id: TaskId,
        /// Type name of the requested kind.
        expected: String,
        /// Type name stored on the task.
        actual: String,
    },

    /// A config or result payload could not be (de)serialised.
    #[error("payload for task type '{task_type}' is malformed: {message}")]
    MalformedPayload {
        /// Task type whose payload failed.
        task_type: String,
        /// Serializer diagnostic.
        message: String,
    },
}

impl TaskDomainError {
    pub(crate) fn malformed(task_type: &str, err: &serde_json::Error) -> Self {
        Self::MalformedPayload {
            task_type: task_type.to_owned(),
            message: err.to_string(),
        }
    }
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);
