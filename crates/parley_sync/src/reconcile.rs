//! Reconciling server results onto local entities.

use crate::delta::MessagePurger;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::transport::Transport;
use parley_core::{Container, ContainerEvent, CreateOutcome, SyncState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Error id the server uses when a distinct resource already exists.
const CONFLICT_ID: &str = "conflict";

/// Error id the server uses when the session must re-authenticate.
const AUTHENTICATION_REQUIRED_ID: &str = "authentication_required";

/// Structured result of a dispatched request.
///
/// `data` is the resource description on success and the error payload
/// on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    /// Whether the server accepted the request.
    pub success: bool,
    /// Response or error payload.
    pub data: serde_json::Value,
}

impl RequestResult {
    /// Creates a successful result.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    /// Creates a failed result.
    pub fn err(data: serde_json::Value) -> Self {
        Self {
            success: false,
            data,
        }
    }

    /// The payload's `id` field, used to discriminate error kinds.
    pub fn data_id(&self) -> Option<&str> {
        self.data.get("id").and_then(|v| v.as_str())
    }
}

impl<T: Transport, P: MessagePurger> SyncEngine<T, P> {
    /// Consumes the result of a create request.
    ///
    /// A destroyed entity discards the completion (in-flight requests
    /// race local teardown harmlessly). Otherwise the paired
    /// `RequestEnded` fires first, even on failure. A `conflict` error
    /// is recoverable: the embedded authoritative description is merged
    /// exactly like a success. Any other failure emits `SendFailed` and
    /// destroys the entity.
    pub fn complete_create(
        &self,
        container: &Arc<Container>,
        result: RequestResult,
    ) -> SyncResult<()> {
        if container.is_destroyed() {
            return Ok(());
        }

        self.events.enqueue(ContainerEvent::RequestEnded {
            request_type: self.config.create_request_type(),
            correlation_id: container.id(),
        });

        if result.success {
            self.reconcile_created(container, &result.data)
        } else if result.data_id() == Some(CONFLICT_ID) {
            debug!(id = %container.id(), "create conflict; merging authoritative resource");
            let resource = match result.data.get("data") {
                Some(embedded) if embedded.is_object() => embedded,
                _ => &result.data,
            };
            self.reconcile_created(container, resource)
        } else {
            warn!(id = %container.id(), "create failed; destroying container");
            self.events.enqueue(ContainerEvent::SendFailed {
                container_id: container.id(),
                error: result.data,
            });
            self.teardown(container);
            Ok(())
        }
    }

    /// Merges a server resource description onto a freshly created
    /// container and classifies the outcome.
    ///
    /// An id change on a non-distinct create is the server assigning
    /// identity to a brand-new resource (`Created`). For a distinct
    /// create it means an existing resource matched the participant
    /// set: `Found` when the requested metadata equals the server's,
    /// `FoundWithMismatch` otherwise.
    fn reconcile_created(
        &self,
        container: &Arc<Container>,
        data: &serde_json::Value,
    ) -> SyncResult<()> {
        let local_id = container.id();
        let requested_metadata = container.metadata_json();
        let requested_distinct = container.is_distinct();

        container.set_sync_state(SyncState::Synced);
        container.merge_server_state(data)?;

        let server_id = data
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or(&local_id)
            .to_string();

        let outcome = if server_id != local_id {
            // Identity observers must see the new id before the
            // completion event: remap, then enqueue the id change
            self.registry.remap(&local_id, &server_id);
            container.set_id(&server_id);
            if !requested_distinct {
                // A non-distinct create always makes a new resource;
                // the id change is just the server assigning identity
                CreateOutcome::Created
            } else if requested_metadata == container.metadata_json() {
                CreateOutcome::Found
            } else {
                CreateOutcome::FoundWithMismatch
            }
        } else {
            CreateOutcome::Created
        };

        debug!(id = %container.id(), ?outcome, "create reconciled");
        self.events.enqueue(ContainerEvent::Sent {
            container_id: container.id(),
            outcome,
        });
        Ok(())
    }

    /// Consumes the result of a metadata patch request.
    ///
    /// On any failure other than an authentication error, the resource
    /// is reloaded from the server to re-derive ground truth.
    pub fn complete_patch(
        &self,
        container: &Arc<Container>,
        result: RequestResult,
    ) -> SyncResult<()> {
        if container.is_destroyed() {
            return Ok(());
        }
        if container.sync_state() == SyncState::SavingPatch {
            container.set_sync_state(SyncState::Synced);
        }

        if !result.success {
            if result.data_id() == Some(AUTHENTICATION_REQUIRED_ID) {
                debug!(id = %container.id(), "patch failed pending authentication");
            } else {
                warn!(id = %container.id(), "patch failed; reloading resource");
                self.dispatch_reload(container)?;
            }
        }
        Ok(())
    }

    /// Consumes the result of a delete request.
    ///
    /// The local teardown was optimistic, so the entity is expected to
    /// be destroyed here; a failed delete heals by reloading.
    pub fn complete_delete(
        &self,
        container: &Arc<Container>,
        result: RequestResult,
    ) -> SyncResult<()> {
        if !result.success && result.data_id() != Some(AUTHENTICATION_REQUIRED_ID) {
            warn!(id = %container.id(), "delete failed; reloading resource");
            self.dispatch_reload(container)?;
        }
        Ok(())
    }

    /// Consumes the result of a reload request.
    ///
    /// Merges the fetched resource onto the live container, or rebuilds
    /// and re-registers a fresh one if the local copy was already
    /// destroyed. Returns the live handle, if any.
    pub fn complete_reload(
        &self,
        container: &Arc<Container>,
        result: RequestResult,
    ) -> SyncResult<Option<Arc<Container>>> {
        if !result.success {
            warn!(id = %container.id(), "reload failed");
            return Ok(None);
        }

        if container.is_destroyed() {
            let id = match result.data.get("id").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => return Ok(None),
            };
            debug!(%id, "rebuilding container from reload");
            let fresh = self.builder().with_id(&id).build();
            fresh.set_sync_state(SyncState::Synced);
            fresh.merge_server_state(&result.data)?;
            self.registry.register(Arc::clone(&fresh));
            Ok(Some(fresh))
        } else {
            container.set_sync_state(SyncState::Synced);
            container.merge_server_state(&result.data)?;
            Ok(Some(Arc::clone(container)))
        }
    }
}
