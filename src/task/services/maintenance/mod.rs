//! Maintenance loops: stuck-task recovery and retention cleanup.
//!
//! Both loops poll the task store on their own interval and never stop on a
//! failed cycle.

mod retention;
mod stuck;

pub use retention::{RetentionCleaner, RetentionPolicy};
pub use stuck::{StuckReason, StuckScanReport, StuckTaskMonitor};

use crate::task::ports::TaskStoreError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that abandon a maintenance cycle.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// The task store failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),

    /// An age cannot be subtracted from the current time.
    #[error("age {0:?} is out of range")]
    AgeOutOfRange(Duration),
}

/// Returns `now - age`.
fn cutoff(now: DateTime<Utc>, age: Duration) -> Result<DateTime<Utc>, MaintenanceError> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or(MaintenanceError::AgeOutOfRange(age))
}
