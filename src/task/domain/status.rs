//! Task status state machine.

use super::ParseTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
///
/// ```text
/// Wait → InProgress → Success
///                   → SuccessWithWarnings
///                   → Fails
/// Wait → Fails              (forced by stuck-task maintenance)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Persisted and waiting for an executor.
    Wait,
    /// Claimed by an executor.
    InProgress,
    /// Finished successfully.
    Success,
    /// Finished with non-fatal warnings.
    SuccessWithWarnings,
    /// Finished with a failure.
    Fails,
}

impl TaskStatus {
    /// Every status, in rank order.
    pub const ALL: [Self; 5] = [
        Self::Wait,
        Self::InProgress,
        Self::Success,
        Self::SuccessWithWarnings,
        Self::Fails,
    ];

    /// Terminal statuses.
    pub const TERMINAL: [Self; 3] = [Self::Success, Self::SuccessWithWarnings, Self::Fails];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::SuccessWithWarnings => "success_with_warnings",
            Self::Fails => "fails",
        }
    }

    /// Position in the partial order `Wait < InProgress < terminal`.
    ///
    /// All terminal statuses share the highest rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Wait => 0,
            Self::InProgress => 1,
            Self::Success | Self::SuccessWithWarnings | Self::Fails => 2,
        }
    }

    /// Returns `true` when no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithWarnings | Self::Fails)
    }

    /// Returns `true` when the state machine permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Wait, Self::InProgress | Self::Fails)
                | (
                    Self::InProgress,
                    Self::Success | Self::SuccessWithWarnings | Self::Fails
                )
        )
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "wait" => Ok(Self::Wait),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "success_with_warnings" => Ok(Self::SuccessWithWarnings),
            "fails" => Ok(Self::Fails),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
