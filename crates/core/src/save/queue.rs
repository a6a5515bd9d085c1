use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::SaveQueueConfig;
use crate::metrics::{SAVE_PERSIST_TOTAL, SAVE_QUEUE_DEPTH};

use super::handle::{Command, CommandSender, SaveError, SaveHandle};
use super::progress::Progress;
use super::store::Persistence;

enum CommandReceiver<P> {
    Unbounded(mpsc::UnboundedReceiver<Command<P>>),
    Bounded(mpsc::Receiver<Command<P>>),
}

impl<P> CommandReceiver<P> {
    fn recv_blocking(&mut self) -> Option<Command<P>> {
        match self {
            Self::Unbounded(rx) => rx.blocking_recv(),
            Self::Bounded(rx) => rx.blocking_recv(),
        }
    }
}

type SharedReceiver<P> = Arc<Mutex<CommandReceiver<P>>>;

/// Source of the `queue` label on the depth gauge.
static NEXT_QUEUE: AtomicUsize = AtomicUsize::new(0);

/// FIFO of entries persisted by a fixed pool of worker threads.
///
/// [`drain`](Self::drain) blocks until every entry pushed before the call
/// has been taken and finished by a worker. Finished means persisted or
/// failed; failures are logged per entry and do not hold the barrier.
///
/// Dropping the queue lets the workers finish the backlog, then joins them.
/// Pushes and drains must come from plain threads, not from async tasks.
pub struct SaveQueue<P: Send + 'static> {
    handle: SaveHandle<P>,
    sender: CommandSender<P>,
    progress: Arc<Progress>,
    workers: Vec<JoinHandle<()>>,
    label: String,
}

impl<P: Send + 'static> SaveQueue<P> {
    /// Start `config.workers` threads persisting into `store`.
    pub fn new(config: &SaveQueueConfig, store: Arc<dyn Persistence<P>>) -> Result<Self, SaveError> {
        let (sender, receiver) = match config.capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (CommandSender::Bounded(tx), CommandReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (CommandSender::Unbounded(tx), CommandReceiver::Unbounded(rx))
            }
        };
        let receiver: SharedReceiver<P> = Arc::new(Mutex::new(receiver));
        let label = NEXT_QUEUE.fetch_add(1, Ordering::Relaxed).to_string();
        let progress = Arc::new(Progress::new(&label));

        let mut queue = Self {
            handle: SaveHandle::new(sender.clone(), Arc::clone(&progress), config.warn_depth),
            sender,
            progress: Arc::clone(&progress),
            workers: Vec::with_capacity(config.workers),
            label,
        };

        for id in 0..config.workers {
            let receiver = Arc::clone(&receiver);
            let progress = Arc::clone(&progress);
            let store = Arc::clone(&store);
            let spawned = thread::Builder::new()
                .name(format!("save-worker-{}", id))
                .spawn(move || worker_loop(id, receiver, progress, store));

            match spawned {
                Ok(worker) => queue.workers.push(worker),
                // Dropping the partial queue stops the workers already started.
                Err(e) => return Err(SaveError::Spawn(e.to_string())),
            }
        }

        info!(
            queue = %queue.label,
            workers = config.workers,
            capacity = ?config.capacity,
            warn_depth = config.warn_depth,
            "Save queue started"
        );
        Ok(queue)
    }

    /// A producer handle for hardware callbacks.
    pub fn handle(&self) -> SaveHandle<P> {
        self.handle.clone()
    }

    /// Queue `payload` under sequence number `seq`.
    pub fn push(&self, seq: u64, payload: P) -> Result<(), SaveError> {
        self.handle.push(seq, payload)
    }

    /// Block until every entry pushed before this call is finished.
    pub fn drain(&self) {
        self.progress.wait_drained(None);
    }

    /// Like [`drain`](Self::drain), giving up after `timeout`.
    /// Returns whether the queue drained.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        self.progress.wait_drained(Some(timeout))
    }

    /// Entries pushed but not yet finished.
    pub fn size(&self) -> usize {
        self.progress.pending() as usize
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Value of the `queue` label this queue reports its depth under.
    pub fn metrics_label(&self) -> &str {
        &self.label
    }
}

impl<P: Send + 'static> Drop for SaveQueue<P> {
    fn drop(&mut self) {
        // One stop per worker, queued behind the backlog.
        for _ in 0..self.workers.len() {
            if self.sender.send_blocking(Command::Stop).is_err() {
                break;
            }
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Save worker panicked");
            }
        }
        if let Err(e) = SAVE_QUEUE_DEPTH.remove_label_values(&[self.label.as_str()]) {
            debug!(queue = %self.label, "Depth gauge already gone: {}", e);
        }
        debug!(queue = %self.label, "Save queue stopped");
    }
}

fn worker_loop<P>(
    id: usize,
    receiver: SharedReceiver<P>,
    progress: Arc<Progress>,
    store: Arc<dyn Persistence<P>>,
) {
    debug!(worker = id, "Save worker started");

    loop {
        // Only one idle worker waits on the channel; the others wait on the lock.
        let command = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv_blocking();

        let entry = match command {
            Some(Command::Save(entry)) => entry,
            Some(Command::Stop) | None => break,
        };

        let seq = entry.seq;
        let ticket = entry.ticket;
        let payload = entry.payload;
        match panic::catch_unwind(AssertUnwindSafe(|| store.persist(seq, payload))) {
            Ok(Ok(())) => {
                SAVE_PERSIST_TOTAL.with_label_values(&["success"]).inc();
                debug!(worker = id, seq, "Persisted entry");
            }
            Ok(Err(e)) => {
                SAVE_PERSIST_TOTAL.with_label_values(&["failure"]).inc();
                warn!(worker = id, seq, "Failed to persist entry: {}", e);
            }
            Err(_) => {
                SAVE_PERSIST_TOTAL.with_label_values(&["failure"]).inc();
                error!(worker = id, seq, "Persistence panicked");
            }
        }
        progress.finish(ticket);
    }

    debug!(worker = id, "Save worker stopped");
}
