//! Progress-reporting, cancellable future.
//!
//! A [`ProgressiveFuture`] is a handle on the outcome of one unit of work that
//! runs on another thread. Besides the result it carries a revisable
//! completion estimate, an optional message, and an optional cancellation hook
//! through which `cancel()` reaches the code doing the work.
//!
//! Cancellation is cooperative: once a running future accepts a cancel request
//! it stays `Running` until the driving code stops and records the terminal
//! state. Waiters therefore never observe a terminal state while the work is
//! still touching hardware.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::types::{add_duration, FutureState, ProgressUpdate, StateError, TaskError};

/// Callback invoked by `cancel()` while the future is running.
/// Returns whether the cancel request was accepted.
pub type CancelHook = Arc<dyn Fn() -> bool + Send + Sync>;

/// Callback invoked on each progress update, on the updating thread.
pub type ProgressObserver = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Type-erased view of a future that can be asked to cancel.
///
/// Orchestrators keep their "current" sub-future behind this trait so that
/// futures of any result type can be cancelled from a single slot.
pub trait Cancellable: Send + Sync {
    /// Request cancellation. See [`ProgressiveFuture::cancel`].
    fn cancel(&self) -> bool;

    /// Identity of the underlying future.
    fn id(&self) -> Uuid;

    /// Current lifecycle state.
    fn state(&self) -> FutureState;
}

struct Shared<T> {
    state: FutureState,
    outcome: Option<Result<T, TaskError>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    message: Option<String>,
    cancel_hook: Option<CancelHook>,
    cancel_requested: bool,
    observers: Vec<ProgressObserver>,
}

struct Inner<T> {
    id: Uuid,
    name: String,
    shared: Mutex<Shared<T>>,
    done: Condvar,
}

/// Shared handle on the outcome of asynchronous work.
///
/// Cloning is cheap; all clones observe the same state.
pub struct ProgressiveFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ProgressiveFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ProgressiveFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("ProgressiveFuture")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &shared.state)
            .field("end", &shared.end)
            .finish()
    }
}

impl<T> ProgressiveFuture<T> {
    /// Create a pending future whose work is expected to take `estimate`
    /// starting now.
    pub fn new(name: impl Into<String>, estimate: Duration) -> Self {
        let start = Utc::now();
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                name: name.into(),
                shared: Mutex::new(Shared {
                    state: FutureState::Pending,
                    outcome: None,
                    start,
                    end: add_duration(start, estimate),
                    message: None,
                    cancel_hook: None,
                    cancel_requested: false,
                    observers: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> FutureState {
        self.lock().state
    }

    /// Whether a terminal state has been reached.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether a cancel request was accepted (or the future was cancelled while pending).
    pub fn cancel_requested(&self) -> bool {
        let shared = self.lock();
        shared.cancel_requested || shared.state == FutureState::Cancelled
    }

    /// Current estimated completion time.
    pub fn eta(&self) -> DateTime<Utc> {
        self.lock().end
    }

    /// Snapshot of the current progress.
    pub fn progress(&self) -> ProgressUpdate {
        let shared = self.lock();
        ProgressUpdate {
            start: shared.start,
            end: shared.end,
            message: shared.message.clone(),
        }
    }

    /// Install the hook `cancel()` invokes while the future is running.
    /// Replaces any previous hook.
    pub fn set_cancel_hook<F>(&self, hook: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.lock().cancel_hook = Some(Arc::new(hook));
    }

    /// Register a progress observer.
    ///
    /// Observers run synchronously on the thread calling `set_progress`, in
    /// registration order, and must not block.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.lock().observers.push(Arc::new(observer));
    }

    /// Request cancellation.
    ///
    /// - Pending: becomes Cancelled immediately, returns `true`.
    /// - Running: the hook decides; without a hook returns `false`.
    /// - Terminal: returns `false`, no side effect.
    pub fn cancel(&self) -> bool {
        let hook = {
            let mut shared = self.lock();
            let state = shared.state;
            match state {
                FutureState::Pending => {
                    shared.state = FutureState::Cancelled;
                    shared.outcome = Some(Err(TaskError::Cancelled));
                    shared.cancel_hook = None;
                    shared.observers.clear();
                    drop(shared);
                    self.inner.done.notify_all();
                    debug!(future = %self.inner.name, "Cancelled before start");
                    return true;
                }
                FutureState::Running => match shared.cancel_hook.clone() {
                    Some(hook) => hook,
                    None => return false,
                },
                _ => return false,
            }
        };

        // The hook may block briefly on the work's own state; never hold our lock across it.
        let accepted = hook();
        if accepted {
            let mut shared = self.lock();
            if !shared.state.is_terminal() {
                shared.cancel_requested = true;
            }
            debug!(future = %self.inner.name, "Cancel request accepted");
        }
        accepted
    }

    /// Block until the future reaches a terminal state, or `timeout` elapses.
    /// Returns whether the future is terminal.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let shared = self.lock();
        match timeout {
            None => {
                let _shared = self
                    .inner
                    .done
                    .wait_while(shared, |s| !s.state.is_terminal())
                    .unwrap_or_else(PoisonError::into_inner);
                true
            }
            Some(limit) => {
                let (shared, _) = self
                    .inner
                    .done
                    .wait_timeout_while(shared, limit, |s| !s.state.is_terminal())
                    .unwrap_or_else(PoisonError::into_inner);
                shared.state.is_terminal()
            }
        }
    }

    /// Transition Pending -> Running.
    ///
    /// Fails if the future was cancelled (or otherwise terminated) first; the
    /// caller must then skip the work entirely.
    pub fn set_running(&self) -> Result<(), StateError> {
        let mut shared = self.lock();
        match shared.state {
            FutureState::Pending => {
                shared.state = FutureState::Running;
                shared.start = Utc::now();
                Ok(())
            }
            FutureState::Running => Ok(()),
            state => Err(StateError::AlreadyTerminal {
                id: self.inner.id.to_string(),
                state,
            }),
        }
    }

    /// Update the estimated completion time. Only valid while running.
    pub fn set_progress(&self, end: DateTime<Utc>) -> Result<(), StateError> {
        self.update(|shared| shared.end = end)
    }

    /// Update both the start and the estimated completion time.
    pub fn set_progress_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.update(|shared| {
            shared.start = start;
            shared.end = end;
        })
    }

    /// Publish a human-readable description of the current step.
    pub fn set_message(&self, message: impl Into<String>) -> Result<(), StateError> {
        let message = message.into();
        self.update(move |shared| shared.message = Some(message))
    }

    fn update<F>(&self, apply: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Shared<T>),
    {
        let (update, observers) = {
            let mut shared = self.lock();
            if shared.state != FutureState::Running {
                return Err(StateError::NotRunning {
                    id: self.inner.id.to_string(),
                    state: shared.state,
                });
            }
            apply(&mut shared);
            let update = ProgressUpdate {
                start: shared.start,
                end: shared.end,
                message: shared.message.clone(),
            };
            (update, shared.observers.clone())
        };

        for observer in &observers {
            observer(&update);
        }
        Ok(())
    }

    /// Terminate successfully.
    pub fn set_result(&self, value: T) -> Result<(), StateError> {
        self.finish(Ok(value))
    }

    /// Terminate with an error. [`TaskError::Cancelled`] yields the Cancelled state.
    pub fn set_error(&self, error: TaskError) -> Result<(), StateError> {
        self.finish(Err(error))
    }

    /// Record the terminal outcome. Exactly once per future.
    pub fn finish(&self, outcome: Result<T, TaskError>) -> Result<(), StateError> {
        let mut shared = self.lock();
        if shared.state.is_terminal() {
            return Err(StateError::AlreadyTerminal {
                id: self.inner.id.to_string(),
                state: shared.state,
            });
        }

        shared.state = match &outcome {
            Ok(_) => FutureState::Succeeded,
            Err(TaskError::Cancelled) => FutureState::Cancelled,
            Err(_) => FutureState::Failed,
        };
        shared.outcome = Some(outcome);
        // Hooks and observers often capture the owner of this future.
        shared.cancel_hook = None;
        shared.observers.clear();
        drop(shared);

        self.inner.done.notify_all();
        Ok(())
    }
}

impl<T: Clone> ProgressiveFuture<T> {
    /// Block until terminal (or `timeout`), then return the result or the error.
    ///
    /// An expired wait yields [`TaskError::WaitTimeout`], which says nothing
    /// about the outcome of the work itself.
    pub fn result(&self, timeout: Option<Duration>) -> Result<T, TaskError> {
        if !self.wait(timeout) {
            return Err(TaskError::WaitTimeout {
                waited: timeout.unwrap_or_default(),
            });
        }
        match &self.lock().outcome {
            Some(outcome) => outcome.clone(),
            None => Err(TaskError::failed("terminal future without outcome")),
        }
    }

    /// The outcome, if terminal, without blocking.
    pub fn try_result(&self) -> Option<Result<T, TaskError>> {
        self.lock().outcome.clone()
    }
}

impl<T: Send + 'static> Cancellable for ProgressiveFuture<T> {
    fn cancel(&self) -> bool {
        ProgressiveFuture::cancel(self)
    }

    fn id(&self) -> Uuid {
        self.inner.id
    }

    fn state(&self) -> FutureState {
        ProgressiveFuture::state(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_new_future_is_pending_with_eta() {
        let before = Utc::now();
        let future: ProgressiveFuture<u32> = ProgressiveFuture::new("f", Duration::from_secs(10));
        assert_eq!(future.state(), FutureState::Pending);
        assert!(future.eta() >= before + chrono::Duration::seconds(10));
        assert!(future.try_result().is_none());
    }

    #[test]
    fn test_set_result_once() {
        let future = ProgressiveFuture::new("f", Duration::ZERO);
        future.set_running().unwrap();
        future.set_result(42).unwrap();
        assert_eq!(future.state(), FutureState::Succeeded);
        assert_eq!(future.result(None), Ok(42));

        let err = future.set_result(43).unwrap_err();
        assert!(matches!(err, StateError::AlreadyTerminal { .. }));
        let err = future.set_error(TaskError::failed("late")).unwrap_err();
        assert!(matches!(err, StateError::AlreadyTerminal { .. }));
        assert_eq!(future.result(None), Ok(42));
    }

    #[test]
    fn test_set_error_states() {
        let failed: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        failed.set_error(TaskError::failed("boom")).unwrap();
        assert_eq!(failed.state(), FutureState::Failed);
        assert_eq!(failed.result(None), Err(TaskError::failed("boom")));

        let cancelled: ProgressiveFuture<()> = ProgressiveFuture::new("c", Duration::ZERO);
        cancelled.set_error(TaskError::Cancelled).unwrap();
        assert_eq!(cancelled.state(), FutureState::Cancelled);
    }

    #[test]
    fn test_cancel_pending() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        assert!(future.cancel());
        assert_eq!(future.state(), FutureState::Cancelled);
        assert!(future.set_running().is_err());
        assert_eq!(future.result(None), Err(TaskError::Cancelled));
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let future = ProgressiveFuture::new("f", Duration::ZERO);
        let calls = Arc::clone(&hook_calls);
        future.set_cancel_hook(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        });
        future.set_running().unwrap();
        future.set_result(1).unwrap();

        assert!(!future.cancel());
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
        assert_eq!(future.state(), FutureState::Succeeded);
    }

    #[test]
    fn test_cancel_running_without_hook() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        future.set_running().unwrap();
        assert!(!future.cancel());
        assert!(!future.cancel_requested());
    }

    #[test]
    fn test_cancel_running_uses_hook() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        future.set_cancel_hook(|| true);
        future.set_running().unwrap();

        assert!(future.cancel());
        assert!(future.cancel_requested());
        // Still running until the work acknowledges.
        assert_eq!(future.state(), FutureState::Running);
        future.set_error(TaskError::Cancelled).unwrap();
        assert_eq!(future.state(), FutureState::Cancelled);
    }

    #[test]
    fn test_rejected_hook() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        future.set_cancel_hook(|| false);
        future.set_running().unwrap();
        assert!(!future.cancel());
        assert!(!future.cancel_requested());
    }

    #[test]
    fn test_progress_only_while_running() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        let end = Utc::now() + chrono::Duration::seconds(3);
        assert!(matches!(
            future.set_progress(end),
            Err(StateError::NotRunning { .. })
        ));

        future.set_running().unwrap();
        future.set_progress(end).unwrap();
        assert_eq!(future.eta(), end);

        future.set_result(()).unwrap();
        assert!(future.set_progress(end).is_err());
    }

    #[test]
    fn test_observers_called_in_order() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            future.add_observer(move |update| {
                seen.lock()
                    .unwrap()
                    .push((tag, update.message.clone()));
            });
        }

        future.set_running().unwrap();
        future.set_message("moving stage").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("first", Some("moving stage".to_string())),
                ("second", Some("moving stage".to_string())),
            ]
        );
    }

    #[test]
    fn test_result_wait_timeout() {
        let future: ProgressiveFuture<()> = ProgressiveFuture::new("f", Duration::ZERO);
        future.set_running().unwrap();
        let err = future
            .result(Some(Duration::from_millis(20)))
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::WaitTimeout {
                waited: Duration::from_millis(20)
            }
        );
        assert_eq!(future.state(), FutureState::Running);
    }

    #[test]
    fn test_result_blocks_until_set_from_other_thread() {
        let future = ProgressiveFuture::new("f", Duration::ZERO);
        future.set_running().unwrap();
        let producer = future.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.set_result("done".to_string()).unwrap();
        });

        assert_eq!(future.result(Some(Duration::from_secs(5))), Ok("done".to_string()));
        handle.join().unwrap();
    }

    #[test]
    fn test_cancellable_trait_object() {
        let future: ProgressiveFuture<Vec<u8>> = ProgressiveFuture::new("f", Duration::ZERO);
        let erased: Arc<dyn Cancellable> = Arc::new(future.clone());
        assert_eq!(erased.id(), future.id());
        assert!(erased.cancel());
        assert_eq!(erased.state(), FutureState::Cancelled);
    }
}
