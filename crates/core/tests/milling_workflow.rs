//! Milling workflow integration tests.
//!
//! Work items go through the phase sequence one phase at a time; a failing
//! phase aborts the run and cancellation is honoured between phases.

use std::sync::Arc;
use std::time::Duration;

use labflow_core::{
    testing::{MockConnector, MockPhaseExecutor},
    ConnectionRegistry, FutureState, MillingOrchestrator, MillingPhase, MillingWorkflow,
    StatusTable, TaskError, TaskRunner, WorkItem,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lamella {
    Marked,
    Rough,
    Polished,
}

struct Harness {
    executor: Arc<MockPhaseExecutor>,
    orchestrator: MillingOrchestrator<Lamella>,
}

impl Harness {
    fn new(executor: MockPhaseExecutor) -> Self {
        let executor = Arc::new(executor);
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(MockConnector::new())));
        let statuses = StatusTable::new()
            .with("rough", Lamella::Rough)
            .with("polish", Lamella::Polished);
        let orchestrator = MillingOrchestrator::new(
            TaskRunner::default(),
            registry,
            "fib",
            executor.clone(),
            statuses,
        );
        Self {
            executor,
            orchestrator,
        }
    }
}

#[test]
fn test_failure_in_first_item_stops_the_run() {
    let harness = Harness::new(MockPhaseExecutor::new());
    harness
        .executor
        .fail_on("site-1", MillingPhase::Acting, TaskError::failed("ion beam drift"));

    let items = vec![
        WorkItem::new("site-1", Lamella::Marked),
        WorkItem::new("site-2", Lamella::Marked),
    ];
    let workflow = MillingWorkflow::new("rough", vec![MillingPhase::Positioning, MillingPhase::Acting]);

    let future = harness.orchestrator.start(items.clone(), workflow);
    let err = future.result(WAIT).unwrap_err();

    assert_eq!(err, TaskError::failed("ion beam drift"));
    assert_eq!(future.state(), FutureState::Failed);
    assert_eq!(items[0].status(), Lamella::Marked);
    assert_eq!(items[1].status(), Lamella::Marked);
    assert_eq!(
        harness.executor.calls(),
        vec![
            ("site-1".to_string(), MillingPhase::Positioning),
            ("site-1".to_string(), MillingPhase::Acting),
        ]
    );
}

#[test]
fn test_failure_in_second_item_keeps_first_status() {
    let harness = Harness::new(MockPhaseExecutor::new());
    harness
        .executor
        .fail_on("site-2", MillingPhase::Positioning, TaskError::failed("stage limit"));

    let items = vec![
        WorkItem::new("site-1", Lamella::Marked),
        WorkItem::new("site-2", Lamella::Marked),
        WorkItem::new("site-3", Lamella::Marked),
    ];
    let workflow = MillingWorkflow::new("polish", vec![MillingPhase::Positioning, MillingPhase::Acting]);

    let future = harness.orchestrator.start(items.clone(), workflow);
    assert!(future.result(WAIT).is_err());

    assert_eq!(items[0].status(), Lamella::Polished);
    assert_eq!(items[1].status(), Lamella::Marked);
    assert_eq!(items[2].status(), Lamella::Marked);
    assert_eq!(harness.executor.calls().len(), 3);
}

#[test]
fn test_cancel_is_observed_between_phases() {
    let harness = Harness::new(MockPhaseExecutor::new().with_delay(Duration::from_millis(30)));
    let items = vec![
        WorkItem::new("site-1", Lamella::Marked),
        WorkItem::new("site-2", Lamella::Marked),
    ];

    let future = harness.orchestrator.start(items.clone(), MillingWorkflow::full("rough"));
    while harness.executor.calls().is_empty() {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(future.cancel());

    assert_eq!(future.result(WAIT), Err(TaskError::Cancelled));
    assert_eq!(future.state(), FutureState::Cancelled);
    // The phase in progress finishes; nothing after it starts.
    assert_eq!(harness.executor.calls().len(), 1);
    assert!(items.iter().all(|i| i.status() == Lamella::Marked));
}

#[test]
fn test_progress_messages_name_item_and_phase() {
    let harness = Harness::new(MockPhaseExecutor::new().with_delay(Duration::from_millis(5)));
    let items = vec![WorkItem::new("site-1", Lamella::Marked)];

    let future = harness.orchestrator.start(items, MillingWorkflow::new("rough", vec![MillingPhase::Imaging]));
    future.result(WAIT).unwrap();

    assert_eq!(
        future.progress().message.as_deref(),
        Some("site-1 (1/1): imaging")
    );
}

#[test]
fn test_eta_published_at_phase_start_reaches_top_level() {
    let harness = Harness::new(
        MockPhaseExecutor::new()
            .with_delay(Duration::from_millis(300))
            .with_early_remaining(Duration::from_secs(3600)),
    );
    let items = vec![WorkItem::new("site-1", Lamella::Marked)];

    let future = harness
        .orchestrator
        .start(items, MillingWorkflow::new("rough", vec![MillingPhase::Acting]));
    std::thread::sleep(Duration::from_millis(100));

    let ahead = future.eta() - chrono::Utc::now();
    assert!(ahead > chrono::Duration::seconds(3500), "eta only {} ahead", ahead);
    future.result(WAIT).unwrap();
}
