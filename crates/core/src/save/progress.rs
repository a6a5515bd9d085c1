//! Completion accounting behind the drain barrier.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use prometheus::IntGauge;

use crate::metrics::SAVE_QUEUE_DEPTH;

#[derive(Debug, Default)]
struct Counts {
    /// Tickets handed out so far.
    issued: u64,
    /// Every ticket below this one is finished.
    watermark: u64,
    /// Finished tickets at or above the watermark.
    finished_above: BTreeSet<u64>,
}

impl Counts {
    fn pending(&self) -> u64 {
        self.issued - self.watermark - self.finished_above.len() as u64
    }
}

/// Tickets entries as they are pushed and records when workers finish them.
///
/// Workers finish entries in any order; the watermark only advances over
/// a contiguous prefix of finished tickets. Depth is published under the
/// owning queue's label.
#[derive(Debug)]
pub(crate) struct Progress {
    counts: Mutex<Counts>,
    finished: Condvar,
    depth: IntGauge,
}

impl Progress {
    pub(crate) fn new(queue: &str) -> Self {
        Self {
            counts: Mutex::default(),
            finished: Condvar::new(),
            depth: SAVE_QUEUE_DEPTH.with_label_values(&[queue]),
        }
    }

    /// Reserve a ticket for a new entry. Returns the ticket and the depth
    /// including that entry.
    pub(crate) fn issue(&self) -> (u64, u64) {
        let mut counts = self.lock();
        let ticket = counts.issued;
        counts.issued += 1;
        let depth = counts.pending();
        self.depth.set(depth as i64);
        (ticket, depth)
    }

    /// Mark `ticket` as finished, whether it was persisted or not.
    pub(crate) fn finish(&self, ticket: u64) {
        let mut guard = self.lock();
        let counts = &mut *guard;
        if ticket < counts.watermark {
            return;
        }
        counts.finished_above.insert(ticket);
        while counts.finished_above.remove(&counts.watermark) {
            counts.watermark += 1;
        }
        self.depth.set(counts.pending() as i64);
        drop(guard);
        self.finished.notify_all();
    }

    /// Entries issued but not finished yet.
    pub(crate) fn pending(&self) -> u64 {
        self.lock().pending()
    }

    /// Block until every ticket issued before this call is finished.
    pub(crate) fn wait_drained(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut counts = self.lock();
        let target = counts.issued;

        while counts.watermark < target {
            counts = match deadline {
                None => self
                    .finished
                    .wait(counts)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.finished
                        .wait_timeout(counts, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_advances_over_contiguous_prefix() {
        let progress = Progress::new("progress-test");
        for _ in 0..3 {
            progress.issue();
        }
        progress.finish(2);
        assert_eq!(progress.pending(), 2);
        assert!(!progress.wait_drained(Some(Duration::from_millis(10))));

        progress.finish(0);
        progress.finish(1);
        assert_eq!(progress.pending(), 0);
        assert!(progress.wait_drained(Some(Duration::ZERO)));
    }

    #[test]
    fn test_drain_ignores_later_tickets() {
        let progress = Progress::new("progress-test");
        let (first, _) = progress.issue();
        progress.finish(first);
        progress.issue();
        // A drain started now must wait for the second ticket.
        assert!(!progress.wait_drained(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_empty_drain_returns_immediately() {
        assert!(Progress::new("progress-test").wait_drained(None));
    }
}
