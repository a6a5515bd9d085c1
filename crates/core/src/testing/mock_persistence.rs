//! Mock persistence for testing.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::save::{PersistError, Persistence};

#[derive(Debug, Default)]
struct Record {
    attempts: usize,
    persisted: Vec<u64>,
    failing: HashSet<u64>,
    panicking: HashSet<u64>,
}

/// Mock implementation of [`Persistence`] for any payload type.
///
/// Records the sequence numbers it persisted and can be told to fail on
/// specific ones, or to panic on them.
#[derive(Debug, Default)]
pub struct MockPersistence {
    record: Mutex<Record>,
    delay: Duration,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `persist` call.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Fail every attempt to persist `seq`.
    pub fn fail_seq(&self, seq: u64) {
        self.lock().failing.insert(seq);
    }

    /// Panic inside every attempt to persist `seq`.
    pub fn panic_on_seq(&self, seq: u64) {
        self.lock().panicking.insert(seq);
    }

    /// Number of `persist` calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn persisted_count(&self) -> usize {
        self.lock().persisted.len()
    }

    /// Successfully persisted sequence numbers, in completion order.
    pub fn persisted_seqs(&self) -> Vec<u64> {
        self.lock().persisted.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Send> Persistence<P> for MockPersistence {
    fn persist(&self, seq: u64, _payload: P) -> Result<(), PersistError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut record = self.lock();
        record.attempts += 1;
        if record.panicking.contains(&seq) {
            drop(record);
            panic!("injected panic for {}", seq);
        }
        if record.failing.contains(&seq) {
            return Err(PersistError::Failed(format!("injected failure for {}", seq)));
        }
        record.persisted.push(seq);
        Ok(())
    }
}
