use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::progress::Progress;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error("save queue closed, entry {seq} dropped")]
    Closed { seq: u64 },

    #[error("failed to start save worker: {0}")]
    Spawn(String),
}

/// Entry waiting to be persisted.
#[derive(Debug, Clone)]
pub struct SaveEntry<P> {
    pub seq: u64,
    pub payload: P,
    pub queued_at: DateTime<Utc>,
    pub(crate) ticket: u64,
}

/// What travels through the channel to the workers.
pub(crate) enum Command<P> {
    Save(SaveEntry<P>),
    Stop,
}

pub(crate) enum CommandSender<P> {
    Unbounded(mpsc::UnboundedSender<Command<P>>),
    Bounded(mpsc::Sender<Command<P>>),
}

impl<P> Clone for CommandSender<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
        }
    }
}

impl<P> CommandSender<P> {
    /// Send, blocking while a bounded channel is full.
    ///
    /// Must not be called from inside an async runtime context.
    pub(crate) fn send_blocking(&self, command: Command<P>) -> Result<(), Command<P>> {
        match self {
            Self::Unbounded(tx) => tx.send(command).map_err(|e| e.0),
            Self::Bounded(tx) => tx.blocking_send(command).map_err(|e| e.0),
        }
    }
}

/// Producer side of a [`SaveQueue`](super::SaveQueue).
///
/// Cheaply cloneable; hand one to every hardware callback that produces
/// data. Pushing never fails the producer for a slow consumer: an
/// unbounded queue only warns past its depth threshold, a bounded one
/// blocks until a worker frees a slot.
pub struct SaveHandle<P> {
    tx: CommandSender<P>,
    progress: Arc<Progress>,
    warn_depth: usize,
}

impl<P> Clone for SaveHandle<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            progress: Arc::clone(&self.progress),
            warn_depth: self.warn_depth,
        }
    }
}

impl<P> SaveHandle<P> {
    pub(crate) fn new(tx: CommandSender<P>, progress: Arc<Progress>, warn_depth: usize) -> Self {
        Self {
            tx,
            progress,
            warn_depth,
        }
    }

    /// Queue `payload` under sequence number `seq`.
    pub fn push(&self, seq: u64, payload: P) -> Result<(), SaveError> {
        let (ticket, depth) = self.progress.issue();
        if depth > self.warn_depth as u64 {
            warn!(
                seq,
                depth,
                threshold = self.warn_depth,
                "Save queue is falling behind"
            );
        }

        let entry = SaveEntry {
            seq,
            payload,
            queued_at: Utc::now(),
            ticket,
        };
        if self.tx.send_blocking(Command::Save(entry)).is_err() {
            error!(seq, "Save queue closed, dropping entry");
            self.progress.finish(ticket);
            return Err(SaveError::Closed { seq });
        }
        Ok(())
    }

    /// Entries pushed but not yet finished by a worker.
    pub fn size(&self) -> usize {
        self.progress.pending() as usize
    }
}
