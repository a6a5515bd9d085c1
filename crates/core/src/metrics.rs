//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrators (runs, outcomes, durations, per-task results)
//! - Single-run guard (rejected concurrent starts)
//! - Save queue (depth, persistence results)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts};

use crate::future::TaskError;

// =============================================================================
// Orchestrators
// =============================================================================

/// Orchestrator runs by orchestrator and outcome.
pub static ORCHESTRATOR_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "labflow_orchestrator_runs_total",
            "Total orchestrator runs by outcome",
        ),
        &["orchestrator", "outcome"], // "succeeded", "partial", "failed", "cancelled", "timeout"
    )
    .unwrap()
});

/// Wall-clock duration of orchestrator runs.
pub static ORCHESTRATOR_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "labflow_orchestrator_run_duration_seconds",
            "Duration of orchestrator runs",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["orchestrator"],
    )
    .unwrap()
});

/// Individual tasks and phases by kind and result.
pub static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("labflow_tasks_total", "Total tasks and phases executed"),
        &["kind", "result"], // result: "succeeded", "failed", "cancelled", "timeout"
    )
    .unwrap()
});

// =============================================================================
// Single-run guard
// =============================================================================

/// Starts rejected because a run was already active.
pub static GUARD_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "labflow_guard_conflicts_total",
        "Total run starts rejected by the single-run guard",
    )
    .unwrap()
});

// =============================================================================
// Save queue
// =============================================================================

/// Entries pushed but not yet finished by a worker, per live queue.
pub static SAVE_QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("labflow_save_queue_depth", "Entries waiting to be persisted"),
        &["queue"],
    )
    .unwrap()
});

/// Persistence attempts by result.
pub static SAVE_PERSIST_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("labflow_save_persist_total", "Total persistence attempts"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrators
        Box::new(ORCHESTRATOR_RUNS.clone()),
        Box::new(ORCHESTRATOR_RUN_DURATION.clone()),
        Box::new(TASKS_TOTAL.clone()),
        // Guard
        Box::new(GUARD_CONFLICTS.clone()),
        // Save queue
        Box::new(SAVE_QUEUE_DEPTH.clone()),
        Box::new(SAVE_PERSIST_TOTAL.clone()),
    ]
}

/// Label for a run or task outcome.
pub(crate) fn outcome_label(error: Option<&TaskError>) -> &'static str {
    error.map_or("succeeded", TaskError::kind)
}
