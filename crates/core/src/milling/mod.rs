//! Milling workflow orchestration.
//!
//! Each work item goes through the workflow's phases (move, align, mill,
//! image) in order, one phase at a time, on the shared future and
//! cancellation machinery used by acquisition.

mod traits;
mod types;
mod workflow;

pub use traits::PhaseExecutor;
pub use types::{MillingPhase, MillingWorkflow, StatusTable, WorkItem};
pub use workflow::MillingOrchestrator;
