use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::ConnectionRegistry;
use crate::future::{Cancellable, ProgressiveFuture, RunControl, TaskContext, TaskError, TaskRunner};
use crate::metrics::GUARD_CONFLICTS;

use super::GuardError;

#[derive(Default)]
struct GuardState {
    active: bool,
    cancel_requested: bool,
    description: Option<String>,
    run_id: Option<Uuid>,
    run: Option<Arc<dyn Cancellable>>,
    control: Option<Arc<RunControl>>,
}

impl GuardState {
    /// Whether a run is between start and cleanup.
    ///
    /// A run cancelled before its thread started is terminal while its
    /// cleanup has not run yet; it no longer counts.
    fn is_running(&self) -> bool {
        self.active
            && self
                .run
                .as_ref()
                .map_or(true, |run| !run.state().is_terminal())
    }
}

/// Observable bookkeeping of a guard, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub active: bool,
    pub cancel_requested: bool,
    pub description: Option<String>,
    pub run_id: Option<Uuid>,
    pub current: Option<Uuid>,
}

/// Ensures at most one run drives a resource at a time.
///
/// The mutex only protects bookkeeping: runs execute on their own thread
/// after it is released, so [`cancel`](Self::cancel) is never stuck behind
/// a hardware call. The guard is released before the run's future becomes
/// terminal, whatever the outcome, panics included.
pub struct SingleRunGuard {
    resource: String,
    runner: TaskRunner,
    registry: Arc<ConnectionRegistry>,
    state: Arc<Mutex<GuardState>>,
}

impl SingleRunGuard {
    /// `resource` is also the registry target asked to abort on cancel.
    pub fn new(resource: impl Into<String>, runner: TaskRunner, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            resource: resource.into(),
            runner,
            registry,
            state: Arc::new(Mutex::new(GuardState::default())),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Start `work` unless another run is active.
    ///
    /// `work` receives a context whose [`RunControl`] is the one the guard
    /// cancels; orchestrators driven from it register their current
    /// sub-future there.
    pub fn start_run<T, F>(
        &self,
        description: impl Into<String>,
        estimate: Duration,
        work: F,
    ) -> Result<ProgressiveFuture<T>, GuardError>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext<T>) -> Result<T, TaskError> + Send + 'static,
    {
        let description = description.into();
        let control = Arc::new(RunControl::new());

        let future = {
            let mut state = self.lock();
            if state.is_running() {
                GUARD_CONFLICTS.inc();
                let active = state.description.clone().unwrap_or_default();
                warn!(
                    resource = %self.resource,
                    requested = %description,
                    active = %active,
                    "Rejected concurrent run"
                );
                return Err(GuardError::ConcurrentRunConflict {
                    resource: self.resource.clone(),
                    active,
                });
            }

            let future: ProgressiveFuture<T> = self.runner.prepare(&self.resource, estimate, &control);
            *state = GuardState {
                active: true,
                cancel_requested: false,
                description: Some(description.clone()),
                run_id: Some(future.id()),
                run: Some(Arc::new(future.clone())),
                control: Some(Arc::clone(&control)),
            };
            future
        };

        info!(resource = %self.resource, run = %future.id(), "Starting guarded run: {}", description);

        let cleanup = RunCleanup {
            state: Arc::clone(&self.state),
            run_id: future.id(),
        };
        self.runner.launch(&future, control, move |ctx| {
            let cleanup = cleanup;
            let outcome = work(ctx);
            // Release before the runner publishes the outcome.
            drop(cleanup);
            outcome
        });

        Ok(future)
    }

    /// Request cancellation of the active run.
    ///
    /// Returns false when no run is active. Otherwise cancels the run's
    /// current sub-future and asks the hardware to abort; abort failures are
    /// logged only.
    pub fn cancel(&self) -> bool {
        let (run, control) = {
            let mut state = self.lock();
            if !state.is_running() {
                return false;
            }
            state.cancel_requested = true;
            (state.run.clone(), state.control.clone())
        };

        info!(resource = %self.resource, "Cancelling guarded run");
        if let Some(control) = control {
            control.request_cancel();
        }
        if let Some(run) = run {
            run.cancel();
        }

        match self.registry.peek(&self.resource) {
            Some(connection) => {
                if let Err(e) = connection.abort() {
                    warn!(resource = %self.resource, "Hardware abort failed: {}", e);
                }
            }
            None => debug!(resource = %self.resource, "No open connection to abort"),
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_running()
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let state = self.lock();
        GuardSnapshot {
            active: state.is_running(),
            cancel_requested: state.cancel_requested,
            description: state.description.clone(),
            run_id: state.run_id,
            current: state
                .control
                .as_ref()
                .and_then(|c| c.current())
                .map(|c| c.id()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SingleRunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleRunGuard")
            .field("resource", &self.resource)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Resets the guard when dropped, if it still belongs to the same run.
///
/// Dropped at the end of the run's work, during unwinding on panic, or
/// with the unused work closure when the run was cancelled before it began.
struct RunCleanup {
    state: Arc<Mutex<GuardState>>,
    run_id: Uuid,
}

impl Drop for RunCleanup {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.run_id == Some(self.run_id) {
            *state = GuardState::default();
            debug!(run = %self.run_id, "Guard released");
        }
    }
}
