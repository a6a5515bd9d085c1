pub mod acquisition;
pub mod config;
pub mod connection;
pub mod future;
pub mod guard;
pub mod metrics;
pub mod milling;
pub mod save;
pub mod task;
pub mod testing;

pub use acquisition::{AcquisitionOrchestrator, AcquisitionOutcome, AcquisitionResults, ResultEntry};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, PollConfig,
    RunnerConfig, SaveQueueConfig,
};
pub use connection::{ConnectionError, ConnectionRegistry, Connector, HardwareConnection};
pub use future::{
    FutureState, PollOutcome, ProgressUpdate, ProgressiveFuture, RunControl, TaskContext,
    TaskError, TaskRunner,
};
pub use guard::{GuardError, GuardSnapshot, SingleRunGuard};
pub use milling::{MillingOrchestrator, MillingPhase, MillingWorkflow, PhaseExecutor, StatusTable, WorkItem};
pub use save::{PersistError, Persistence, SaveError, SaveHandle, SaveQueue};
pub use task::{adapt, AcquisitionTask, LegacyAcquirer, Leech, Payload, SeriesHooks, TaskKind, TaskSource};
