//! Mock hardware connections for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::{ConnectionError, Connector, HardwareConnection};

/// Mock implementation of [`HardwareConnection`].
#[derive(Debug)]
pub struct MockConnection {
    target: String,
    alive: AtomicBool,
    closed: AtomicBool,
    aborts: AtomicUsize,
    fail_abort: AtomicBool,
}

impl MockConnection {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            aborts: AtomicUsize::new(0),
            fail_abort: AtomicBool::new(false),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Make every following abort request fail.
    pub fn fail_abort(&self) {
        self.fail_abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl HardwareConnection for MockConnection {
    fn target(&self) -> &str {
        &self.target
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn abort(&self) -> Result<(), ConnectionError> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(ConnectionError::Abort(format!("{} did not acknowledge", self.target)));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Opened {
    latest: HashMap<String, Arc<MockConnection>>,
    counts: HashMap<String, usize>,
    failing: HashSet<String>,
}

/// Mock implementation of [`Connector`] handing out [`MockConnection`]s.
#[derive(Debug, Default)]
pub struct MockConnector {
    opened: Mutex<Opened>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to open `target`.
    pub fn fail_open(&self, target: &str) {
        self.lock().failing.insert(target.to_string());
    }

    /// The most recently opened connection to `target`.
    pub fn connection(&self, target: &str) -> Option<Arc<MockConnection>> {
        self.lock().latest.get(target).cloned()
    }

    pub fn open_count(&self, target: &str) -> usize {
        self.lock().counts.get(target).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Opened> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    fn open(&self, target: &str) -> Result<Arc<dyn HardwareConnection>, ConnectionError> {
        let mut opened = self.lock();
        if opened.failing.contains(target) {
            return Err(ConnectionError::Open {
                target: target.to_string(),
                reason: "device not found".to_string(),
            });
        }
        let connection = Arc::new(MockConnection::new(target));
        opened.latest.insert(target.to_string(), Arc::clone(&connection));
        *opened.counts.entry(target.to_string()).or_insert(0) += 1;
        Ok(connection)
    }
}
