//! Processing server-pushed patch and delete events.

use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::transport::Transport;
use parking_lot::Mutex;
use parley_core::{Container, ContainerEvent};
use parley_patch::PatchOp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Server-defined scope of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMode {
    /// Remove the resource for every participant.
    AllParticipants,
    /// Clear only the local user's devices.
    MyDevices,
}

impl DeletionMode {
    /// Returns the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionMode::AllParticipants => "all_participants",
            DeletionMode::MyDevices => "my_devices",
        }
    }

    /// Parses the wire spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "all_participants" => Some(DeletionMode::AllParticipants),
            "my_devices" => Some(DeletionMode::MyDevices),
            _ => None,
        }
    }
}

impl fmt::Display for DeletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owning-client collaborator that stores message history.
///
/// A partial purge drops messages at or after a position without
/// touching the container itself; full removal goes through teardown
/// instead.
pub trait MessagePurger: Send + Sync {
    /// Drops the container's messages at or after `from_position`.
    fn purge_from(&self, container_id: &str, from_position: u64);
}

/// A purger that records calls, for tests.
#[derive(Debug, Default)]
pub struct MemoryPurger {
    calls: Mutex<Vec<(String, u64)>>,
}

impl MemoryPurger {
    /// Creates a new memory purger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded purge call, in order.
    pub fn calls(&self) -> Vec<(String, u64)> {
        self.calls.lock().clone()
    }
}

impl MessagePurger for MemoryPurger {
    fn purge_from(&self, container_id: &str, from_position: u64) {
        self.calls
            .lock()
            .push((container_id.to_string(), from_position));
    }
}

impl<T: Transport, P: MessagePurger> SyncEngine<T, P> {
    /// Applies a server-pushed patch to a container.
    ///
    /// The operations run through the patch codec under the entity's
    /// suppression guard so its own change hook does not re-interpret
    /// the writes. When the patch addresses metadata and actually
    /// changes the tree, one `MetadataChanged` notification carries the
    /// raw paths with the before/after values; an idempotent echo is a
    /// silent no-op. Destroyed containers discard the event.
    pub fn handle_remote_patch(
        &self,
        container: &Arc<Container>,
        ops: &[PatchOp],
    ) -> SyncResult<()> {
        if container.is_destroyed() {
            return Ok(());
        }

        let old_value = container.metadata_json();
        container.apply_patch_ops(ops)?;
        let new_value = container.metadata_json();

        let touches_metadata = ops
            .iter()
            .any(|op| op.segments().next() == Some("metadata"));
        if touches_metadata && old_value != new_value {
            self.events.enqueue(ContainerEvent::MetadataChanged {
                container_id: container.id(),
                paths: ops.iter().map(|op| op.property.clone()).collect(),
                old_value,
                new_value,
            });
        }
        Ok(())
    }

    /// Applies a server-pushed delete to a container.
    ///
    /// "My devices" with a cursor position is a partial purge: messages
    /// at or after the position are dropped by the owning client and the
    /// container stays alive. Every other combination is full local
    /// teardown. Destroyed containers discard the event.
    pub fn handle_remote_delete(
        &self,
        container: &Arc<Container>,
        mode: DeletionMode,
        from_position: Option<u64>,
    ) {
        if container.is_destroyed() {
            return;
        }

        match (mode, from_position) {
            (DeletionMode::MyDevices, Some(position)) => {
                debug!(id = %container.id(), position, "partial purge from server delete");
                self.purger.purge_from(&container.id(), position);
            }
            _ => {
                debug!(id = %container.id(), %mode, "full teardown from server delete");
                self.teardown(container);
            }
        }
    }
}
