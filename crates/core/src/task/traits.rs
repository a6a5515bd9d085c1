//! Interfaces tasks and their auxiliary processors implement.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::future::{ProgressiveFuture, TaskError, TaskRunner};

use super::types::{Payload, TaskKind};

/// Failure of a batch hook. Always logged, never propagated.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(String),
}

/// A schedulable acquisition, consumed once per batch.
pub trait AcquisitionTask: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    fn estimated_duration(&self) -> Duration;

    /// Start acquiring. Must tolerate never being called when the batch is
    /// cancelled first.
    fn acquire(&self, runner: &TaskRunner) -> ProgressiveFuture<Vec<Payload>>;

    /// Auxiliary processors attached to this task.
    fn leeches(&self) -> Vec<Arc<dyn Leech>> {
        Vec::new()
    }
}

/// Auxiliary processor attached to a task (drift correction, ...).
///
/// Takes no part in scheduling. Leeches that want to hear about batch
/// boundaries expose [`SeriesHooks`].
pub trait Leech: Send + Sync {
    fn name(&self) -> &str;

    /// Optional batch-boundary capability.
    fn series_hooks(&self) -> Option<&dyn SeriesHooks> {
        None
    }
}

/// Notified before the first and after the last task of a batch.
pub trait SeriesHooks: Send + Sync {
    fn series_start(&self) -> Result<(), HookError>;

    fn series_complete(&self, results: &[Payload]) -> Result<(), HookError>;
}

/// Older acquisition source that can only block until its data is ready.
pub trait LegacyAcquirer: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    fn estimated_duration(&self) -> Duration;

    fn acquire_blocking(&self) -> Result<Vec<Payload>, TaskError>;

    fn leeches(&self) -> Vec<Arc<dyn Leech>> {
        Vec::new()
    }
}
