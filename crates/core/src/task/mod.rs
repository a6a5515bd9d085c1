//! Acquisition tasks: what they produce, how they are ordered, and how
//! legacy sources are brought under the same interface.

mod adapter;
mod ordering;
mod traits;
mod types;

pub use adapter::{adapt, TaskSource};
pub use ordering::{
    execution_order, order_by_weight, weight, COMPOSITE_WEIGHT, ELECTRON_WEIGHT,
    FLUORESCENCE_WEIGHT, OPTICAL_WEIGHT, OVERLAY_WEIGHT, UNKNOWN_WEIGHT,
};
pub use traits::{AcquisitionTask, HookError, LegacyAcquirer, Leech, SeriesHooks};
pub use types::{Metadata, Payload, TaskKind};
