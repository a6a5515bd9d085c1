//! Mock acquisition task for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::future::{ProgressiveFuture, TaskError, TaskRunner};
use crate::task::{AcquisitionTask, Leech, Payload, TaskKind};

/// Names of tasks in the order their acquisition started.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Read an execution log.
pub fn logged(log: &ExecutionLog) -> Vec<String> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Step used while simulating acquisition time.
const TICK: Duration = Duration::from_millis(2);

/// Mock implementation of [`AcquisitionTask`].
///
/// Provides controllable behavior for testing:
/// - Fixed payloads or a fixed failure
/// - Simulated acquisition time, cancellable between ticks
/// - A shared log recording execution order
///
/// # Example
///
/// ```rust,ignore
/// use labflow_core::testing::MockTask;
///
/// let task = MockTask::new("sem", TaskKind::Electron)
///     .with_estimate(Duration::from_secs(2))
///     .with_frames(3);
/// ```
pub struct MockTask {
    name: String,
    kind: TaskKind,
    estimate: Duration,
    delay: Duration,
    payloads: Vec<Payload>,
    failure: Option<TaskError>,
    leeches: Vec<Arc<dyn Leech>>,
    log: Option<ExecutionLog>,
    acquisitions: AtomicUsize,
    early_remaining: Option<Duration>,
}

impl MockTask {
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            estimate: Duration::from_secs(1),
            delay: Duration::ZERO,
            payloads: Vec::new(),
            failure: None,
            leeches: Vec::new(),
            log: None,
            acquisitions: AtomicUsize::new(0),
            early_remaining: None,
        }
    }

    /// Declared duration used for ordering-independent ETA math.
    pub fn with_estimate(mut self, estimate: Duration) -> Self {
        self.estimate = estimate;
        self
    }

    /// Real time spent acquiring.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Publish `remaining` as the task's ETA as soon as it starts running.
    pub fn with_early_remaining(mut self, remaining: Duration) -> Self {
        self.early_remaining = Some(remaining);
        self
    }

    pub fn with_payloads(mut self, payloads: Vec<Payload>) -> Self {
        self.payloads = payloads;
        self
    }

    /// `count` small frames with distinct contents.
    pub fn with_frames(mut self, count: usize) -> Self {
        self.payloads = (0..count)
            .map(|i| Payload::new(vec![2, 2], vec![i as u16; 4]))
            .collect();
        self
    }

    pub fn failing(mut self, error: TaskError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn with_leech(mut self, leech: Arc<dyn Leech>) -> Self {
        self.leeches.push(leech);
        self
    }

    pub fn with_log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Wrap for handing to an orchestrator.
    pub fn shared(self) -> Arc<dyn AcquisitionTask> {
        Arc::new(self)
    }

    /// How many times `acquire` was called.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl AcquisitionTask for MockTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        self.kind.clone()
    }

    fn estimated_duration(&self) -> Duration {
        self.estimate
    }

    fn acquire(&self, runner: &TaskRunner) -> ProgressiveFuture<Vec<Payload>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(self.name.clone());
        }

        let delay = self.delay;
        let payloads = self.payloads.clone();
        let failure = self.failure.clone();
        let early_remaining = self.early_remaining;
        runner.run(&self.name, self.estimate, move |ctx| {
            if let Some(remaining) = early_remaining {
                ctx.set_remaining(remaining);
            }
            let started = Instant::now();
            while started.elapsed() < delay {
                ctx.check_cancelled()?;
                thread::sleep(TICK.min(delay));
            }
            match failure {
                Some(error) => Err(error),
                None => Ok(payloads),
            }
        })
    }

    fn leeches(&self) -> Vec<Arc<dyn Leech>> {
        self.leeches.clone()
    }
}
