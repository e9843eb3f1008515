//! Live connection tracking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::connection::ClientConnection;

/// Connected clients indexed by connection ID, with a hard capacity.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Create a registry admitting at most `capacity` connections.
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Add a connection unless the registry is full.
    ///
    /// Returns `false` when at capacity; the connection is not added.
    pub fn try_add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write();
        if conns.len() >= self.capacity {
            return false;
        }
        let _ = conns.insert(connection.id.to_string(), connection);
        true
    }

    /// Remove a connection by ID.
    pub fn remove(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(connection_id)
    }

    /// Look up a connection by ID.
    pub fn get(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(connection_id).cloned()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether another connection would be refused.
    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    /// Maximum number of connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// IDs of all live connections (sorted).
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
