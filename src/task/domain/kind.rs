//! Task type discriminator and the typed task-kind contract.

use super::TaskDomainError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// Discriminator naming a concrete task kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskTypeName(String);

impl TaskTypeName {
    /// Creates a validated task type name.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskType`] when the value is empty
    /// or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(TaskDomainError::InvalidTaskType(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the type name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskTypeName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A concrete kind of task with its own input and output shapes.
///
/// The engine never interprets `Config` or `Output`; they are stored as
/// opaque JSON and only read back by executors and callers.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tasklane::task::domain::TaskKind;
///
/// #[derive(Serialize, Deserialize)]
/// struct ResizeConfig { width: u32 }
///
/// #[derive(Serialize, Deserialize)]
/// struct ResizeOutput { bytes: u64 }
///
/// struct Resize;
///
/// impl TaskKind for Resize {
///     const TYPE_NAME: &'static str = "Resize";
///     type Config = ResizeConfig;
///     type Output = ResizeOutput;
/// }
/// ```
pub trait TaskKind: Send + Sync + 'static {
    /// Stored discriminator for this kind.
    const TYPE_NAME: &'static str;

    /// Input payload.
    type Config: Serialize + DeserializeOwned + Send + Sync;

    /// Output payload written by the executor.
    type Output: Serialize + DeserializeOwned + Send + Sync;

    /// Returns the validated type name for this kind.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskType`] when `TYPE_NAME` is not a
    /// valid type name.
    fn type_name() -> Result<TaskTypeName, TaskDomainError> {
        TaskTypeName::new(Self::TYPE_NAME)
    }
}
