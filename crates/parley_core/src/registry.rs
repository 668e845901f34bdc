//! Identity registry of live containers.

use crate::container::{Container, ContainerId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Indexes live containers by id.
///
/// Identity is rewritten only at two points: the reconciliation engine's
/// remap when the server assigns the real id, and teardown. No other
/// component writes registry identity.
pub struct Registry {
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a container under its current id.
    pub fn register(&self, container: Arc<Container>) {
        self.containers.write().insert(container.id(), container);
    }

    /// Resolves a container by id.
    pub fn resolve(&self, id: &str) -> Option<Arc<Container>> {
        self.containers.read().get(id).cloned()
    }

    /// Returns true if the id resolves.
    pub fn contains(&self, id: &str) -> bool {
        self.containers.read().contains_key(id)
    }

    /// Removes a container, returning it if it was registered.
    pub fn remove(&self, id: &str) -> Option<Arc<Container>> {
        self.containers.write().remove(id)
    }

    /// Re-keys a container from a provisional id to a server-assigned id.
    ///
    /// Returns false (and changes nothing) if the old id does not
    /// resolve. The old id stops resolving atomically with the new id
    /// becoming resolvable.
    pub fn remap(&self, old_id: &str, new_id: &str) -> bool {
        let mut containers = self.containers.write();
        match containers.remove(old_id) {
            Some(container) => {
                containers.insert(new_id.to_string(), container);
                true
            }
            None => false,
        }
    }

    /// Returns the number of registered containers.
    pub fn len(&self) -> usize {
        self.containers.read().len()
    }

    /// Returns true if no containers are registered.
    pub fn is_empty(&self) -> bool {
        self.containers.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
