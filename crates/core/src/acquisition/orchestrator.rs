//! Sequential execution of an acquisition batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::future::{add_duration, ProgressiveFuture, RunControl, TaskContext, TaskError, TaskRunner};
use crate::metrics::{outcome_label, ORCHESTRATOR_RUNS, ORCHESTRATOR_RUN_DURATION, TASKS_TOTAL};
use crate::task::{execution_order, AcquisitionTask, Leech, Payload};

use super::reconcile::reconcile;
use super::types::{AcquisitionOutcome, AcquisitionResults, ResultEntry};

const ORCHESTRATOR: &str = "acquisition";

/// Runs acquisition tasks one at a time in weight order.
///
/// Each [`start`](Self::start) drives its batch on a dedicated thread and
/// reports through a single top-level future. Cancelling that future stops
/// the batch before the next task and cancels the one in progress.
#[derive(Debug, Clone)]
pub struct AcquisitionOrchestrator {
    runner: TaskRunner,
}

impl AcquisitionOrchestrator {
    pub fn new(runner: TaskRunner) -> Self {
        Self { runner }
    }

    /// Start a batch in the background.
    pub fn start(&self, tasks: Vec<Arc<dyn AcquisitionTask>>) -> ProgressiveFuture<AcquisitionOutcome> {
        self.start_with_control(tasks, Arc::new(RunControl::new()))
    }

    /// Like [`start`](Self::start), reporting the current task through `control`.
    pub fn start_with_control(
        &self,
        tasks: Vec<Arc<dyn AcquisitionTask>>,
        control: Arc<RunControl>,
    ) -> ProgressiveFuture<AcquisitionOutcome> {
        let estimate = total_estimate(&tasks);
        let orchestrator = self.clone();
        self.runner
            .run_with_control(ORCHESTRATOR, estimate, control, move |ctx| {
                orchestrator.drive(ctx, &tasks)
            })
    }

    /// Drive a batch on the calling thread.
    ///
    /// Succeeds with partial results when at least one task completed before
    /// the batch stopped; fails with the stopping error otherwise.
    pub fn drive(
        &self,
        ctx: &TaskContext<AcquisitionOutcome>,
        tasks: &[Arc<dyn AcquisitionTask>],
    ) -> Result<AcquisitionOutcome, TaskError> {
        let started = Instant::now();
        info!(tasks = tasks.len(), "Starting acquisition batch");

        let order = execution_order(tasks);
        let estimates: Vec<Duration> = order.iter().map(|&i| tasks[i].estimated_duration()).collect();
        ctx.set_remaining(estimates.iter().sum());

        let leeches: Vec<Vec<Arc<dyn Leech>>> = tasks.iter().map(|t| t.leeches()).collect();
        series_start(tasks, &leeches);

        let mut results = AcquisitionResults::new();
        let mut error = None;

        for (position, &index) in order.iter().enumerate() {
            if ctx.is_cancelled() {
                info!(remaining = order.len() - position, "Batch cancelled before next task");
                error = Some(TaskError::Cancelled);
                break;
            }

            let task = &tasks[index];
            let after: Duration = estimates[position + 1..].iter().sum();
            ctx.set_remaining(estimates[position].saturating_add(after));
            ctx.set_message(format!(
                "Acquiring {} ({}/{})",
                task.name(),
                position + 1,
                order.len()
            ));

            match self.acquire_one(ctx, task.as_ref(), after) {
                Ok(payloads) => {
                    debug!(task = %task.name(), frames = payloads.len(), "Task completed");
                    results.insert(ResultEntry {
                        index,
                        task: task.name().to_string(),
                        kind: task.kind(),
                        payloads,
                    });
                }
                Err(e) => {
                    warn!(task = %task.name(), "Task stopped the batch: {}", e);
                    error = Some(e);
                    break;
                }
            }
        }

        if !results.is_empty() {
            series_complete(tasks, &leeches, &results);
            reconcile(&mut results);
        }

        let label = match (&error, results.is_empty()) {
            (Some(_), false) => "partial",
            (e, _) => outcome_label(e.as_ref()),
        };
        ORCHESTRATOR_RUNS.with_label_values(&[ORCHESTRATOR, label]).inc();
        ORCHESTRATOR_RUN_DURATION
            .with_label_values(&[ORCHESTRATOR])
            .observe(started.elapsed().as_secs_f64());

        match error {
            Some(e) if results.is_empty() => {
                info!("Acquisition batch ended without results: {}", e);
                Err(e)
            }
            error => {
                info!(
                    tasks = results.len(),
                    complete = error.is_none(),
                    "Acquisition batch finished"
                );
                Ok(AcquisitionOutcome { results, error })
            }
        }
    }

    /// Run one task and block for its payloads, keeping the top-level ETA
    /// at the task's own ETA plus the estimates of the tasks after it.
    fn acquire_one(
        &self,
        ctx: &TaskContext<AcquisitionOutcome>,
        task: &dyn AcquisitionTask,
        after: Duration,
    ) -> Result<Vec<Payload>, TaskError> {
        let sub = task.acquire(&self.runner);
        ctx.control().set_current(Arc::new(sub.clone()));

        let top = ctx.clone();
        sub.add_observer(move |update| top.set_eta(add_duration(update.end, after)));
        // Catch up with anything the sub-future published before the observer existed.
        ctx.set_eta(add_duration(sub.eta(), after));

        let outcome = sub.result(None);
        ctx.control().clear_current();

        let kind = task.kind();
        TASKS_TOTAL
            .with_label_values(&[kind.as_str(), outcome_label(outcome.as_ref().err())])
            .inc();
        outcome
    }
}

fn total_estimate(tasks: &[Arc<dyn AcquisitionTask>]) -> Duration {
    tasks.iter().map(|t| t.estimated_duration()).sum()
}

fn series_start(tasks: &[Arc<dyn AcquisitionTask>], leeches: &[Vec<Arc<dyn Leech>>]) {
    for (task, leeches) in tasks.iter().zip(leeches) {
        for leech in leeches {
            let Some(hooks) = leech.series_hooks() else {
                continue;
            };
            if let Err(e) = hooks.series_start() {
                warn!(task = %task.name(), leech = %leech.name(), "series_start failed: {}", e);
            }
        }
    }
}

fn series_complete(
    tasks: &[Arc<dyn AcquisitionTask>],
    leeches: &[Vec<Arc<dyn Leech>>],
    results: &AcquisitionResults,
) {
    for (index, (task, leeches)) in tasks.iter().zip(leeches).enumerate() {
        let payloads = results.for_index(index).unwrap_or(&[]);
        for leech in leeches {
            let Some(hooks) = leech.series_hooks() else {
                continue;
            };
            if let Err(e) = hooks.series_complete(payloads) {
                warn!(task = %task.name(), leech = %leech.name(), "series_complete failed: {}", e);
            }
        }
    }
}
