//! Aggregated outcome of batch operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of an operation, ordered from best to worst.
///
/// Batch operations fold the status of every sub-operation with
/// [`Status::worst`], so one failing profile or asset makes the batch fail
/// while the independent successes still stand.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Status {
    /// Everything succeeded.
    Success,
    /// Succeeded, but something was skipped or degraded.
    Warning,
    /// Stopped early by a cancellation request.
    Cancelled,
    /// At least one sub-operation failed.
    Failure,
}

impl Status {
    /// Returns the more severe of two statuses.
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }

    /// Returns `true` for [`Status::Success`] and [`Status::Warning`].
    pub fn is_ok(self) -> bool {
        self <= Status::Warning
    }

    /// Returns `true` for [`Status::Failure`].
    pub fn is_failure(self) -> bool {
        self == Status::Failure
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

impl FromIterator<Status> for Status {
    fn from_iter<I: IntoIterator<Item = Status>>(iter: I) -> Self {
        iter.into_iter().fold(Status::Success, Status::worst)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Warning => write!(f, "warning"),
            Status::Cancelled => write!(f, "cancelled"),
            Status::Failure => write!(f, "failure"),
        }
    }
}
