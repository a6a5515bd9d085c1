//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every collaborator trait
//! (tasks, leeches, persistence, phase executors, hardware connections),
//! allowing orchestration to be tested without hardware.
//!
//! # Example
//!
//! ```rust,ignore
//! use labflow_core::testing::{MockTask, MockLeech};
//!
//! let leech = Arc::new(MockLeech::new("drift"));
//! let task = MockTask::new("sem", TaskKind::Electron)
//!     .with_frames(2)
//!     .with_leech(leech.clone())
//!     .shared();
//!
//! let outcome = orchestrator.start(vec![task]).result(None)?;
//! assert_eq!(leech.start_count(), 1);
//! ```

mod mock_connector;
mod mock_leech;
mod mock_persistence;
mod mock_phase_executor;
mod mock_task;

pub use mock_connector::{MockConnection, MockConnector};
pub use mock_leech::MockLeech;
pub use mock_persistence::MockPersistence;
pub use mock_phase_executor::MockPhaseExecutor;
pub use mock_task::{logged, ExecutionLog, MockTask};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::json;

    use crate::task::{Metadata, Payload};

    /// A correction record carrying a single `key: value` entry.
    pub fn correction_record(key: &str, value: f64) -> Payload {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), json!(value));
        Payload::metadata_only(metadata)
    }

    /// The two records an overlay task produces: light first, electron second.
    pub fn overlay_records() -> Vec<Payload> {
        vec![
            correction_record("light_shift", 1.25),
            correction_record("electron_shift", -0.75),
        ]
    }

    /// A small frame filled with `value`.
    pub fn frame(value: u16) -> Payload {
        Payload::new(vec![2, 2], vec![value; 4])
    }
}
