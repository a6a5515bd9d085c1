//! Acquisition orchestration: ordered, sequential, cancellable batches.
//!
//! A batch runs tasks strictly one at a time in weight order, keeps partial
//! results when it stops early, notifies leeches at its boundaries, and
//! reconciles metadata across the results once at the end.

mod orchestrator;
mod reconcile;
mod types;

pub use orchestrator::AcquisitionOrchestrator;
pub use reconcile::reconcile;
pub use types::{AcquisitionOutcome, AcquisitionResults, ResultEntry};
