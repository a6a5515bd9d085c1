//! Cancellation plumbing shared by orchestrators and the single-run guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::progressive::Cancellable;

/// Run-scoped cancellation flag plus the "current" sub-future slot.
///
/// At most one sub-future is current at a time. The driving thread is the
/// only writer of the slot; any thread may request cancellation.
#[derive(Default)]
pub struct RunControl {
    cancel_requested: AtomicBool,
    current: Mutex<Option<Arc<dyn Cancellable>>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested for this run.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Flag the run as cancelled and best-effort cancel the current sub-future.
    ///
    /// Always accepted: the driving loop observes the flag at its next checkpoint.
    pub fn request_cancel(&self) -> bool {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(current) = current {
            let accepted = current.cancel();
            debug!(sub_future = %current.id(), accepted, "Propagated cancel to current sub-future");
        }
        true
    }

    /// Record `future` as the current sub-future.
    ///
    /// If cancellation was requested concurrently the sub-future is cancelled
    /// right away, so a request can never slip between the checkpoint and
    /// the registration.
    pub fn set_current(&self, future: Arc<dyn Cancellable>) {
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&future));
        if self.is_cancel_requested() {
            future.cancel();
        }
    }

    pub fn clear_current(&self) {
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The current sub-future, if any.
    pub fn current(&self) -> Option<Arc<dyn Cancellable>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("cancel_requested", &self.is_cancel_requested())
            .field("current", &self.current().map(|c| c.id()))
            .finish()
    }
}
