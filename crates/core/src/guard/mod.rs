//! Mutual exclusion of runs against one physical resource.

mod single_run;

pub use single_run::{GuardSnapshot, SingleRunGuard};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("{resource} is busy with another run: {active}")]
    ConcurrentRunConflict { resource: String, active: String },
}
