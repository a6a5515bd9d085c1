use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence failed: {0}")]
    Failed(String),
}

/// Where save-queue workers write entries.
///
/// Called concurrently from every worker thread. Failures are logged by the
/// worker and never retried.
pub trait Persistence<P>: Send + Sync {
    fn persist(&self, seq: u64, payload: P) -> Result<(), PersistError>;
}
