//! Types shared by futures, runners and orchestrators.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a [`ProgressiveFuture`](super::ProgressiveFuture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureState {
    /// Created, execution not started yet.
    Pending,
    /// Execution in progress.
    Running,
    /// Terminated by cooperative cancellation.
    Cancelled,
    /// Terminated with a result.
    Succeeded,
    /// Terminated with an error.
    Failed,
}

impl FutureState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome errors carried by a future.
///
/// `Clone` because a future is shared: every waiter receives the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Terminated by cooperative cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// The task or phase itself reported a failure.
    #[error("task failed: {0}")]
    Failed(String),

    /// A bounded hardware wait exceeded its deadline; the device state is unknown.
    #[error("operation timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// The caller's own wait on the future expired. The future keeps running.
    #[error("gave up waiting after {waited:?}")]
    WaitTimeout { waited: Duration },
}

impl TaskError {
    /// Convenience constructor for [`TaskError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
            Self::Timeout { .. } => "timeout",
            Self::WaitTimeout { .. } => "wait_timeout",
        }
    }
}

/// Illegal transition attempted on a future.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// A terminal state was already set.
    #[error("future {id} already terminated as {state}")]
    AlreadyTerminal { id: String, state: FutureState },

    /// Operation requires the future to be running.
    #[error("future {id} is {state}, expected running")]
    NotRunning { id: String, state: FutureState },
}

/// Progress notification delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// When the work started (or is expected to start).
    pub start: DateTime<Utc>,
    /// Current estimate of completion.
    pub end: DateTime<Utc>,
    /// Optional human-readable description of the current step.
    pub message: Option<String>,
}

/// Add a std duration to a wall-clock time, saturating on overflow.
pub fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
