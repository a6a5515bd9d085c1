use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::{ConnectionError, Connector, HardwareConnection};

/// Connections keyed by target identity.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    connections: Mutex<HashMap<String, Arc<dyn HardwareConnection>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// A live connection to `target`, opening or reopening as needed.
    pub fn get(&self, target: &str) -> Result<Arc<dyn HardwareConnection>, ConnectionError> {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = connections.get(target) {
            if existing.is_alive() {
                return Ok(Arc::clone(existing));
            }
            warn!(target = %target, "Connection went stale, reopening");
            existing.close();
            connections.remove(target);
        }

        let connection = self.connector.open(target)?;
        info!(target = %target, "Opened hardware connection");
        connections.insert(target.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    /// The cached connection to `target` without validating or opening one.
    pub fn peek(&self, target: &str) -> Option<Arc<dyn HardwareConnection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
    }

    /// Drop the cached connection so the next lookup reopens it.
    pub fn invalidate(&self, target: &str) {
        let removed = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target);
        if let Some(connection) = removed {
            debug!(target = %target, "Invalidated connection");
            connection.close();
        }
    }

    /// Close every cached connection.
    pub fn close_all(&self) {
        let drained: Vec<_> = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (target, connection) in drained {
            debug!(target = %target, "Closing connection");
            connection.close();
        }
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;

    #[test]
    fn test_get_reuses_live_connection() {
        let connector = Arc::new(MockConnector::new());
        let registry = ConnectionRegistry::new(connector.clone());

        let a = registry.get("fib").unwrap();
        let b = registry.get("fib").unwrap();
        assert_eq!(a.target(), "fib");
        assert_eq!(connector.open_count("fib"), 1);
        assert_eq!(b.target(), "fib");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_connection_is_reopened() {
        let connector = Arc::new(MockConnector::new());
        let registry = ConnectionRegistry::new(connector.clone());

        registry.get("stage").unwrap();
        connector.connection("stage").unwrap().set_alive(false);

        let fresh = registry.get("stage").unwrap();
        assert!(fresh.is_alive());
        assert_eq!(connector.open_count("stage"), 2);
    }

    #[test]
    fn test_open_failure_is_returned() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_open("laser");
        let registry = ConnectionRegistry::new(connector);

        assert!(matches!(
            registry.get("laser"),
            Err(ConnectionError::Open { .. })
        ));
        assert!(registry.peek("laser").is_none());
    }

    #[test]
    fn test_invalidate_and_close_all() {
        let connector = Arc::new(MockConnector::new());
        let registry = ConnectionRegistry::new(connector.clone());

        registry.get("a").unwrap();
        registry.get("b").unwrap();
        registry.invalidate("a");
        assert!(registry.peek("a").is_none());
        assert!(connector.connection("a").unwrap().is_closed());

        registry.close_all();
        assert!(registry.is_empty());
        assert!(connector.connection("b").unwrap().is_closed());
    }
}
