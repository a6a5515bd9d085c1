//! Single-run guard integration tests.
//!
//! A guard wraps the acquisition orchestrator; these tests inject success,
//! failure and cancellation and check that the guard is always released.

use std::sync::Arc;
use std::time::Duration;

use labflow_core::{
    testing::{logged, ExecutionLog, MockConnector, MockTask},
    AcquisitionOrchestrator, AcquisitionOutcome, AcquisitionTask, ConnectionRegistry, GuardError,
    ProgressiveFuture, SingleRunGuard, TaskError, TaskKind, TaskRunner,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

struct Harness {
    guard: SingleRunGuard,
    orchestrator: AcquisitionOrchestrator,
    connector: Arc<MockConnector>,
    registry: Arc<ConnectionRegistry>,
}

impl Harness {
    fn new() -> Self {
        let runner = TaskRunner::default();
        let connector = Arc::new(MockConnector::new());
        let registry = Arc::new(ConnectionRegistry::new(connector.clone()));
        Self {
            guard: SingleRunGuard::new("microscope", runner.clone(), Arc::clone(&registry)),
            orchestrator: AcquisitionOrchestrator::new(runner),
            connector,
            registry,
        }
    }

    fn start(
        &self,
        description: &str,
        tasks: Vec<Arc<dyn AcquisitionTask>>,
    ) -> Result<ProgressiveFuture<AcquisitionOutcome>, GuardError> {
        let orchestrator = self.orchestrator.clone();
        self.guard
            .start_run(description, Duration::from_secs(1), move |ctx| {
                orchestrator.drive(ctx, &tasks)
            })
    }
}

fn quick(name: &str) -> Arc<dyn AcquisitionTask> {
    MockTask::new(name, TaskKind::Optical).with_frames(1).shared()
}

#[test]
fn test_guard_released_after_every_outcome() {
    let harness = Harness::new();

    // Success
    let future = harness.start("ok", vec![quick("fm")]).unwrap();
    assert!(future.result(WAIT).is_ok());
    assert!(!harness.guard.is_active());

    // Failure
    let failing = MockTask::new("sem", TaskKind::Electron)
        .failing(TaskError::failed("vacuum lost"))
        .shared();
    let future = harness.start("failing", vec![failing]).unwrap();
    assert_eq!(future.result(WAIT), Err(TaskError::failed("vacuum lost")));
    assert!(!harness.guard.is_active());

    // Cancellation
    let log = ExecutionLog::default();
    let slow = MockTask::new("slow", TaskKind::Electron)
        .with_delay(Duration::from_secs(30))
        .with_log(log.clone())
        .shared();
    let future = harness.start("cancelled", vec![slow]).unwrap();
    while logged(&log).is_empty() {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(harness.guard.cancel());
    assert_eq!(future.result(WAIT), Err(TaskError::Cancelled));
    assert!(!harness.guard.is_active());

    // And a new run starts right away.
    let future = harness.start("again", vec![quick("fm")]).unwrap();
    assert!(future.result(WAIT).is_ok());
}

#[test]
fn test_rejected_start_leaves_active_run_untouched() {
    let harness = Harness::new();
    let log = ExecutionLog::default();
    let slow = MockTask::new("slow", TaskKind::Electron)
        .with_delay(Duration::from_secs(30))
        .with_log(log.clone())
        .shared();

    let running = harness.start("first", vec![slow]).unwrap();
    while logged(&log).is_empty() {
        std::thread::sleep(Duration::from_millis(1));
    }

    let before = harness.guard.snapshot();
    assert!(before.active);
    assert_eq!(before.description.as_deref(), Some("first"));
    assert_eq!(before.run_id, Some(running.id()));

    for _ in 0..3 {
        let err = harness.start("second", vec![quick("fm")]).unwrap_err();
        assert!(matches!(err, GuardError::ConcurrentRunConflict { .. }));
        assert_eq!(harness.guard.snapshot(), before);
    }

    harness.guard.cancel();
    assert_eq!(running.result(WAIT), Err(TaskError::Cancelled));
}

#[test]
fn test_cancel_reaches_current_task_and_hardware() {
    let harness = Harness::new();
    harness.registry.get("microscope").unwrap();

    let log = ExecutionLog::default();
    let done = MockTask::new("fm", TaskKind::Optical)
        .with_frames(1)
        .with_log(log.clone())
        .shared();
    let slow = MockTask::new("sem", TaskKind::Electron)
        .with_delay(Duration::from_secs(30))
        .with_log(log.clone())
        .shared();

    let future = harness.start("batch", vec![slow, done]).unwrap();
    while logged(&log).len() < 2 {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(harness.guard.cancel());

    let outcome = future.result(WAIT).unwrap();
    assert_eq!(outcome.error, Some(TaskError::Cancelled));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(
        harness
            .connector
            .connection("microscope")
            .unwrap()
            .abort_count(),
        1
    );
}

#[test]
fn test_cancel_when_idle() {
    let harness = Harness::new();
    assert!(!harness.guard.cancel());
    assert!(!harness.guard.snapshot().cancel_requested);
}
