//! Launches work on background threads and wires its outcome into a future.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::{PollConfig, RunnerConfig};

use super::control::RunControl;
use super::poll::{poll_until, PollOutcome, PollSettings};
use super::progressive::ProgressiveFuture;
use super::types::{add_duration, TaskError};

/// View of its own future handed to running work.
///
/// Exposes cooperative cancellation and progress reporting, but not the
/// terminal transitions, which stay with the runner.
pub struct TaskContext<T> {
    future: ProgressiveFuture<T>,
    control: Arc<RunControl>,
    poll: PollSettings,
}

impl<T> Clone for TaskContext<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            control: Arc::clone(&self.control),
            poll: self.poll,
        }
    }
}

impl<T> TaskContext<T> {
    /// Whether cancellation of this work has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancel_requested()
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Cancellation state and current sub-future slot of this run.
    pub fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    /// Identity of the future this work reports to.
    pub fn future_id(&self) -> uuid::Uuid {
        self.future.id()
    }

    /// Publish a new completion estimate.
    pub fn set_eta(&self, end: DateTime<Utc>) {
        if let Err(e) = self.future.set_progress(end) {
            warn!(future = %self.future.name(), "Progress update rejected: {}", e);
        }
    }

    /// Publish a completion estimate of `now + remaining`.
    pub fn set_remaining(&self, remaining: Duration) {
        self.set_eta(add_duration(Utc::now(), remaining));
    }

    /// Publish a human-readable description of the current step.
    pub fn set_message(&self, message: impl Into<String>) {
        if let Err(e) = self.future.set_message(message) {
            warn!(future = %self.future.name(), "Progress message rejected: {}", e);
        }
    }

    /// Poll hardware with the configured interval and timeout margin,
    /// stopping early on cancellation.
    pub fn poll<V, P>(&self, expected: Duration, probe: P) -> Result<PollOutcome<V>, TaskError>
    where
        P: FnMut() -> Result<Option<V>, TaskError>,
    {
        poll_until(&self.poll, expected, || self.is_cancelled(), probe)
    }
}

/// Starts units of work, one background thread each.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    thread_prefix: String,
    poll: PollSettings,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(&RunnerConfig::default(), &PollConfig::default())
    }
}

impl TaskRunner {
    pub fn new(runner: &RunnerConfig, poll: &PollConfig) -> Self {
        Self {
            thread_prefix: runner.thread_name_prefix.clone(),
            poll: PollSettings::from(poll),
        }
    }

    pub fn poll_settings(&self) -> &PollSettings {
        &self.poll
    }

    /// Run `work` in the background and return its future.
    pub fn run<T, F>(&self, name: &str, estimate: Duration, work: F) -> ProgressiveFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext<T>) -> Result<T, TaskError> + Send + 'static,
    {
        self.run_with_control(name, estimate, Arc::new(RunControl::new()), work)
    }

    /// Like [`run`](Self::run), reporting cancellation through `control`.
    pub fn run_with_control<T, F>(
        &self,
        name: &str,
        estimate: Duration,
        control: Arc<RunControl>,
        work: F,
    ) -> ProgressiveFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext<T>) -> Result<T, TaskError> + Send + 'static,
    {
        let future = self.prepare(name, estimate, &control);
        self.launch(&future, control, work);
        future
    }

    /// Create a pending future whose cancel hook forwards to `control`.
    ///
    /// Nothing runs until [`launch`](Self::launch) is called.
    pub fn prepare<T>(
        &self,
        name: &str,
        estimate: Duration,
        control: &Arc<RunControl>,
    ) -> ProgressiveFuture<T> {
        let future = ProgressiveFuture::new(name, estimate);
        let hook_control = Arc::clone(control);
        future.set_cancel_hook(move || hook_control.request_cancel());
        future
    }

    /// Start `work` for a prepared future on a new thread.
    ///
    /// If the future was cancelled before the thread starts, `work` never runs.
    pub fn launch<T, F>(&self, future: &ProgressiveFuture<T>, control: Arc<RunControl>, work: F)
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext<T>) -> Result<T, TaskError> + Send + 'static,
    {
        let ctx = TaskContext {
            future: future.clone(),
            control,
            poll: self.poll,
        };
        let thread_name = format!("{}-{}", self.thread_prefix, future.name());

        let spawned = thread::Builder::new()
            .name(thread_name)
            .spawn(move || execute(ctx, work));

        if let Err(e) = spawned {
            error!(future = %future.name(), "Failed to spawn worker thread: {}", e);
            if let Err(e) = future.set_error(TaskError::failed(format!("spawn failed: {}", e))) {
                error!("{}", e);
            }
        }
    }
}

fn execute<T, F>(ctx: TaskContext<T>, work: F)
where
    T: Send + 'static,
    F: FnOnce(&TaskContext<T>) -> Result<T, TaskError>,
{
    let future = ctx.future.clone();
    if future.set_running().is_err() {
        debug!(future = %future.name(), "Skipping work, future already {}", future.state());
        return;
    }
    debug!(future = %future.name(), id = %future.id(), "Work started");

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(&ctx))) {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(future = %future.name(), "Work panicked");
            Err(TaskError::failed(format!("{} panicked", future.name())))
        }
    };

    match &outcome {
        Ok(_) => debug!(future = %future.name(), "Work succeeded"),
        Err(e) => debug!(future = %future.name(), "Work ended: {}", e),
    }

    if let Err(e) = future.finish(outcome) {
        error!("Dropping outcome of {}: {}", future.name(), e);
    }
}
