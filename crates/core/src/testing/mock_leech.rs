//! Mock leech for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::task::{HookError, Leech, Payload, SeriesHooks};

/// Mock implementation of [`Leech`] recording batch-boundary calls.
pub struct MockLeech {
    name: String,
    hooks: bool,
    fail: AtomicBool,
    starts: AtomicUsize,
    completions: Mutex<Vec<usize>>,
}

impl MockLeech {
    /// A leech exposing [`SeriesHooks`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: true,
            fail: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            completions: Mutex::new(Vec::new()),
        }
    }

    /// A leech without batch hooks.
    pub fn without_hooks(name: impl Into<String>) -> Self {
        Self {
            hooks: false,
            ..Self::new(name)
        }
    }

    /// Make every hook call fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of payloads passed to each `series_complete` call.
    pub fn completions(&self) -> Vec<usize> {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn outcome(&self) -> Result<(), HookError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(HookError::Failed(format!("{} is broken", self.name)))
        } else {
            Ok(())
        }
    }
}

impl Leech for MockLeech {
    fn name(&self) -> &str {
        &self.name
    }

    fn series_hooks(&self) -> Option<&dyn SeriesHooks> {
        if self.hooks {
            Some(self)
        } else {
            None
        }
    }
}

impl SeriesHooks for MockLeech {
    fn series_start(&self) -> Result<(), HookError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    fn series_complete(&self, results: &[Payload]) -> Result<(), HookError> {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(results.len());
        self.outcome()
    }
}
