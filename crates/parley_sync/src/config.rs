//! Configuration for the sync engine.

use parley_core::CONTAINER_KIND;

/// Configuration for container sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root path segment for container resources.
    pub resource_root: String,
}

impl SyncConfig {
    /// Creates a configuration with the default resource root.
    pub fn new() -> Self {
        Self {
            resource_root: CONTAINER_KIND.to_string(),
        }
    }

    /// Overrides the resource root (e.g. `"channels"`).
    pub fn with_resource_root(mut self, root: impl Into<String>) -> Self {
        self.resource_root = root.into();
        self
    }

    /// Path of the container collection.
    pub fn collection_path(&self) -> String {
        self.resource_root.clone()
    }

    /// Path of a single container resource.
    pub fn resource_path(&self, id: &str) -> String {
        format!("{}/{}", self.resource_root, id)
    }

    /// Request type tag for create requests, derived from the resource
    /// kind.
    pub fn create_request_type(&self) -> String {
        format!("{}.create", self.resource_root)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let config = SyncConfig::default();
        assert_eq!(config.collection_path(), "conversations");
        assert_eq!(config.resource_path("c-9"), "conversations/c-9");
        assert_eq!(config.create_request_type(), "conversations.create");
    }

    #[test]
    fn resource_root_override() {
        let config = SyncConfig::new().with_resource_root("channels");
        assert_eq!(config.resource_path("ch-1"), "channels/ch-1");
        assert_eq!(config.create_request_type(), "channels.create");
    }
}
