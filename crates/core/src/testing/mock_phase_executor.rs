//! Mock milling phase executor for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::connection::HardwareConnection;
use crate::future::{ProgressiveFuture, TaskError, TaskRunner};
use crate::milling::{MillingPhase, PhaseExecutor, WorkItem};

#[derive(Debug, Default)]
struct State {
    calls: Vec<(String, MillingPhase)>,
    failures: HashMap<(String, MillingPhase), TaskError>,
}

/// Mock implementation of [`PhaseExecutor`] for any status type.
///
/// Every phase succeeds after `delay` unless a failure was injected for
/// that (item, phase) pair.
#[derive(Debug)]
pub struct MockPhaseExecutor {
    state: Mutex<State>,
    estimate: Duration,
    delay: Duration,
    early_remaining: Option<Duration>,
}

impl Default for MockPhaseExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPhaseExecutor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            estimate: Duration::from_secs(1),
            delay: Duration::ZERO,
            early_remaining: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Publish `remaining` as the phase ETA as soon as a phase starts.
    pub fn with_early_remaining(mut self, remaining: Duration) -> Self {
        self.early_remaining = Some(remaining);
        self
    }

    pub fn with_estimate(mut self, estimate: Duration) -> Self {
        self.estimate = estimate;
        self
    }

    /// Make `phase` fail with `error` on the item named `item`.
    pub fn fail_on(&self, item: &str, phase: MillingPhase, error: TaskError) {
        self.lock().failures.insert((item.to_string(), phase), error);
    }

    /// (item, phase) pairs in the order they were started.
    pub fn calls(&self) -> Vec<(String, MillingPhase)> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Send + Sync> PhaseExecutor<S> for MockPhaseExecutor {
    fn estimate(&self, _phase: MillingPhase, _item: &WorkItem<S>) -> Duration {
        self.estimate
    }

    fn execute(
        &self,
        phase: MillingPhase,
        item: &WorkItem<S>,
        _connection: &Arc<dyn HardwareConnection>,
        runner: &TaskRunner,
    ) -> ProgressiveFuture<()> {
        let failure = {
            let mut state = self.lock();
            state.calls.push((item.name().to_string(), phase));
            state.failures.get(&(item.name().to_string(), phase)).cloned()
        };

        let delay = self.delay;
        let early_remaining = self.early_remaining;
        runner.run(
            &format!("{}-{}", item.name(), phase),
            self.estimate,
            move |ctx| {
                if let Some(remaining) = early_remaining {
                    ctx.set_remaining(remaining);
                }
                // Phases run to completion once started.
                thread::sleep(delay);
                match failure {
                    Some(error) => Err(error),
                    None => Ok(()),
                }
            },
        )
    }
}
