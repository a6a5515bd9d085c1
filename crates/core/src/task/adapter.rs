//! Uniform task interface over native and legacy acquisition sources.
//!
//! The choice between the two is made once, when the task is built, so the
//! orchestrator loop only ever sees [`AcquisitionTask`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::future::{ProgressiveFuture, TaskRunner};

use super::traits::{AcquisitionTask, LegacyAcquirer, Leech};
use super::types::{Payload, TaskKind};

/// Where a task comes from.
pub enum TaskSource {
    /// Already returns a future.
    Native(Arc<dyn AcquisitionTask>),
    /// Blocks until done; needs to be wrapped.
    Legacy(Arc<dyn LegacyAcquirer>),
}

impl From<Arc<dyn AcquisitionTask>> for TaskSource {
    fn from(task: Arc<dyn AcquisitionTask>) -> Self {
        Self::Native(task)
    }
}

impl From<Arc<dyn LegacyAcquirer>> for TaskSource {
    fn from(acquirer: Arc<dyn LegacyAcquirer>) -> Self {
        Self::Legacy(acquirer)
    }
}

/// Build the task the orchestrator will run for `source`.
pub fn adapt(source: TaskSource) -> Arc<dyn AcquisitionTask> {
    match source {
        TaskSource::Native(task) => task,
        TaskSource::Legacy(inner) => {
            debug!(task = %inner.name(), "Wrapping legacy acquirer");
            Arc::new(LegacyTaskAdapter { inner })
        }
    }
}

/// Runs a blocking acquirer on the task runner.
struct LegacyTaskAdapter {
    inner: Arc<dyn LegacyAcquirer>,
}

impl AcquisitionTask for LegacyTaskAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> TaskKind {
        self.inner.kind()
    }

    fn estimated_duration(&self) -> Duration {
        self.inner.estimated_duration()
    }

    fn acquire(&self, runner: &TaskRunner) -> ProgressiveFuture<Vec<Payload>> {
        let inner = Arc::clone(&self.inner);
        runner.run(self.inner.name(), self.inner.estimated_duration(), move |ctx| {
            ctx.check_cancelled()?;
            // No cancellation point inside a legacy acquisition.
            inner.acquire_blocking()
        })
    }

    fn leeches(&self) -> Vec<Arc<dyn Leech>> {
        self.inner.leeches()
    }
}
