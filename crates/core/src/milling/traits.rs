use std::sync::Arc;
use std::time::Duration;

use crate::connection::HardwareConnection;
use crate::future::{ProgressiveFuture, TaskRunner};

use super::types::{MillingPhase, WorkItem};

/// Performs the phases of a milling workflow on the hardware.
pub trait PhaseExecutor<S>: Send + Sync {
    /// Expected duration of `phase` on `item`.
    fn estimate(&self, phase: MillingPhase, item: &WorkItem<S>) -> Duration;

    /// Start `phase` on `item`. The returned future is cancelled
    /// cooperatively when the run is cancelled.
    fn execute(
        &self,
        phase: MillingPhase,
        item: &WorkItem<S>,
        connection: &Arc<dyn HardwareConnection>,
        runner: &TaskRunner,
    ) -> ProgressiveFuture<()>;
}
