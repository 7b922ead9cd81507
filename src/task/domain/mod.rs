//! Domain model for the task lifecycle engine.
//!
//! The task domain models persisted units of work, their forward-only status
//! machine, typed task kinds and the process-wide type registry while keeping
//! all infrastructure concerns outside of the domain boundary.

mod error;
mod filter;
mod ids;
mod kind;
mod registration;
mod status;
mod task;

pub use error::{ParseTaskStatusError, TaskDomainError};
pub use filter::TaskFilter;
pub use ids::{TaskId, UserId};
pub use kind::{TaskKind, TaskTypeName};
pub use registration::{EventKeyFn, TaskTypeRegistration, TaskTypeRegistry};
pub use status::TaskStatus;
pub use task::{PersistedTaskData, Task};
