//! Hardware connections, owned by an explicit registry.
//!
//! Orchestrators and guards receive a [`ConnectionRegistry`] at construction
//! and look connections up by target identity. A cached connection is
//! validated on every lookup and reopened when it has gone stale.

mod registry;

pub use registry::ConnectionRegistry;

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("failed to open connection to {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("connection to {0} lost")]
    Lost(String),

    #[error("abort request failed: {0}")]
    Abort(String),
}

/// An open link to one piece of hardware.
pub trait HardwareConnection: Send + Sync {
    /// Identity of the hardware this connection talks to.
    fn target(&self) -> &str;

    /// Whether the link still answers.
    fn is_alive(&self) -> bool;

    /// Ask the hardware to stop its current physical operation.
    fn abort(&self) -> Result<(), ConnectionError>;

    fn close(&self) {}
}

/// Opens connections for the registry.
pub trait Connector: Send + Sync {
    fn open(&self, target: &str) -> Result<Arc<dyn HardwareConnection>, ConnectionError>;
}
