//! Sequential milling of work items, phase by phase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::connection::{ConnectionRegistry, HardwareConnection};
use crate::future::{add_duration, ProgressiveFuture, RunControl, TaskContext, TaskError, TaskRunner};
use crate::metrics::{outcome_label, ORCHESTRATOR_RUNS, ORCHESTRATOR_RUN_DURATION, TASKS_TOTAL};

use super::traits::PhaseExecutor;
use super::types::{MillingPhase, MillingWorkflow, StatusTable, WorkItem};

const ORCHESTRATOR: &str = "milling";

/// Runs a workflow's phases on each work item in turn.
///
/// Cancellation is observed between phases only. The first failing phase
/// aborts the whole run: later phases and later items are not attempted,
/// and items already finished keep their updated status.
pub struct MillingOrchestrator<S> {
    runner: TaskRunner,
    registry: Arc<ConnectionRegistry>,
    target: String,
    executor: Arc<dyn PhaseExecutor<S>>,
    statuses: StatusTable<S>,
}

impl<S> Clone for MillingOrchestrator<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            registry: Arc::clone(&self.registry),
            target: self.target.clone(),
            executor: Arc::clone(&self.executor),
            statuses: self.statuses.clone(),
        }
    }
}

impl<S> MillingOrchestrator<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// `target` names the milling hardware inside `registry`.
    pub fn new(
        runner: TaskRunner,
        registry: Arc<ConnectionRegistry>,
        target: impl Into<String>,
        executor: Arc<dyn PhaseExecutor<S>>,
        statuses: StatusTable<S>,
    ) -> Self {
        Self {
            runner,
            registry,
            target: target.into(),
            executor,
            statuses,
        }
    }

    /// Start milling `items` in the background.
    pub fn start(&self, items: Vec<WorkItem<S>>, workflow: MillingWorkflow) -> ProgressiveFuture<()> {
        self.start_with_control(items, workflow, Arc::new(RunControl::new()))
    }

    /// Like [`start`](Self::start), reporting the current phase through `control`.
    pub fn start_with_control(
        &self,
        items: Vec<WorkItem<S>>,
        workflow: MillingWorkflow,
        control: Arc<RunControl>,
    ) -> ProgressiveFuture<()> {
        let estimate = self.estimates(&items, &workflow).iter().sum();
        let orchestrator = self.clone();
        self.runner
            .run_with_control(ORCHESTRATOR, estimate, control, move |ctx| {
                orchestrator.drive(ctx, &items, &workflow)
            })
    }

    /// Run the workflow on the calling thread.
    pub fn drive(
        &self,
        ctx: &TaskContext<()>,
        items: &[WorkItem<S>],
        workflow: &MillingWorkflow,
    ) -> Result<(), TaskError> {
        let started = Instant::now();
        info!(
            workflow = %workflow.name,
            items = items.len(),
            phases = workflow.phases.len(),
            "Starting milling run"
        );

        let outcome = self.run_items(ctx, items, workflow);

        ORCHESTRATOR_RUNS
            .with_label_values(&[ORCHESTRATOR, outcome_label(outcome.as_ref().err())])
            .inc();
        ORCHESTRATOR_RUN_DURATION
            .with_label_values(&[ORCHESTRATOR])
            .observe(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(()) => info!(workflow = %workflow.name, "Milling run finished"),
            Err(e) => warn!(workflow = %workflow.name, "Milling run aborted: {}", e),
        }
        outcome
    }

    fn run_items(
        &self,
        ctx: &TaskContext<()>,
        items: &[WorkItem<S>],
        workflow: &MillingWorkflow,
    ) -> Result<(), TaskError> {
        let connection = self.registry.get(&self.target).map_err(|e| {
            TaskError::failed(format!("milling hardware unavailable: {}", e))
        })?;

        let estimates = self.estimates(items, workflow);
        let mut step = 0;

        for (position, item) in items.iter().enumerate() {
            for &phase in &workflow.phases {
                if ctx.is_cancelled() {
                    info!(item = %item.name(), phase = %phase, "Milling cancelled");
                    return Err(TaskError::Cancelled);
                }

                let after: Duration = estimates[step + 1..].iter().sum();
                ctx.set_remaining(estimates[step].saturating_add(after));
                ctx.set_message(format!(
                    "{} ({}/{}): {}",
                    item.name(),
                    position + 1,
                    items.len(),
                    phase
                ));

                self.run_phase(ctx, phase, item, &connection, after)?;
                step += 1;
            }

            match self.statuses.get(&workflow.name) {
                Some(status) => item.set_status(status.clone()),
                None => warn!(
                    workflow = %workflow.name,
                    item = %item.name(),
                    "No status registered for workflow"
                ),
            }
            debug!(item = %item.name(), "Work item done");
        }

        Ok(())
    }

    fn run_phase(
        &self,
        ctx: &TaskContext<()>,
        phase: MillingPhase,
        item: &WorkItem<S>,
        connection: &Arc<dyn HardwareConnection>,
        after: Duration,
    ) -> Result<(), TaskError> {
        debug!(item = %item.name(), phase = %phase, "Starting phase");
        let sub = self.executor.execute(phase, item, connection, &self.runner);
        ctx.control().set_current(Arc::new(sub.clone()));

        let top = ctx.clone();
        sub.add_observer(move |update| top.set_eta(add_duration(update.end, after)));
        // Catch up with anything the sub-future published before the observer existed.
        ctx.set_eta(add_duration(sub.eta(), after));

        let outcome = sub.result(None);
        ctx.control().clear_current();

        TASKS_TOTAL
            .with_label_values(&[phase.as_str(), outcome_label(outcome.as_ref().err())])
            .inc();

        if let Err(TaskError::Timeout { limit }) = &outcome {
            // The hardware is in an unknown state; make the next run reconnect.
            warn!(item = %item.name(), phase = %phase, ?limit, "Phase timed out");
            self.registry.invalidate(&self.target);
        }
        outcome
    }

    /// Estimated duration of every (item, phase) step, in execution order.
    fn estimates(&self, items: &[WorkItem<S>], workflow: &MillingWorkflow) -> Vec<Duration> {
        items
            .iter()
            .flat_map(|item| {
                workflow
                    .phases
                    .iter()
                    .map(move |&phase| self.executor.estimate(phase, item))
            })
            .collect()
    }
}
