//! The client-side sync engine.

use crate::config::SyncConfig;
use crate::delta::{DeletionMode, MessagePurger};
use crate::error::SyncResult;
use crate::transport::{Method, RequestDescriptor, Transport};
use chrono::Utc;
use parley_core::{
    Container, ContainerBuilder, ContainerEvent, EventBus, Registry, SyncState,
};
use parley_patch::{build_delete_ops, build_set_ops, PatchOp, PATCH_CONTENT_TYPE};
use std::sync::Arc;
use tracing::debug;

/// Drives container synchronization against a remote server.
///
/// The engine applies local mutations optimistically, shapes request
/// descriptors for the [`Transport`] collaborator, and later consumes
/// the structured results through its `complete_*` entry points. It
/// never blocks on the network. All notifications go through the
/// deferred [`EventBus`], so observers run only after the host flushes
/// the queue.
pub struct SyncEngine<T: Transport, P: MessagePurger> {
    pub(crate) config: SyncConfig,
    pub(crate) transport: Arc<T>,
    pub(crate) purger: Arc<P>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) events: Arc<EventBus>,
}

impl<T: Transport, P: MessagePurger> SyncEngine<T, P> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, purger: P) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            purger: Arc::new(purger),
            registry: Arc::new(Registry::new()),
            events: Arc::new(EventBus::new()),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The transport collaborator.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The message-history collaborator.
    pub fn purger(&self) -> &Arc<P> {
        &self.purger
    }

    /// The registry of live containers.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The event bus the engine and its containers emit on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Starts building a container wired to this engine's bus.
    pub fn builder(&self) -> ContainerBuilder {
        ContainerBuilder::new(Arc::clone(&self.events))
    }

    /// Registers a container under its current id.
    pub fn track(&self, container: &Arc<Container>) {
        self.registry.register(Arc::clone(container));
    }

    /// Issues the create request for a locally new container.
    ///
    /// Legal only from `New`; any other state (or a destroyed entity) is
    /// a silent no-op, so the network request goes out exactly once.
    /// Sets the creation timestamp if absent, transitions to `Syncing`,
    /// and pairs the dispatch with a `RequestStarted` notification.
    pub fn send(&self, container: &Arc<Container>) -> SyncResult<()> {
        if container.is_destroyed() {
            return Ok(());
        }
        if !container.sync_state().can_send() {
            debug!(id = %container.id(), state = ?container.sync_state(), "send skipped");
            return Ok(());
        }

        container.ensure_created_at(Utc::now());
        container.set_sync_state(SyncState::Syncing);

        let correlation_id = container.id();
        self.events.enqueue(ContainerEvent::RequestStarted {
            request_type: self.config.create_request_type(),
            correlation_id: correlation_id.clone(),
        });

        let request =
            RequestDescriptor::new(Method::Post, self.config.collection_path(), correlation_id)
                .with_body(container.create_payload());
        debug!(id = %container.id(), "dispatching create");
        self.transport.dispatch(request)
    }

    /// Sets metadata properties, optimistically and then on the server.
    ///
    /// Entries are dotted paths (bare paths are rooted under
    /// `metadata`) with string or nested string-map values. Values are
    /// validated before anything is applied. Silent no-op once
    /// destroyed.
    pub fn set_metadata_properties(
        &self,
        container: &Arc<Container>,
        entries: Vec<(String, serde_json::Value)>,
    ) -> SyncResult<()> {
        self.apply_local_patch(container, build_set_ops(entries))
    }

    /// Deletes metadata properties, optimistically and then on the
    /// server.
    pub fn delete_metadata_properties(
        &self,
        container: &Arc<Container>,
        paths: Vec<String>,
    ) -> SyncResult<()> {
        self.apply_local_patch(container, build_delete_ops(paths))
    }

    /// Requests deletion of the container and tears it down locally.
    ///
    /// The teardown is optimistic; if the request later fails, the
    /// completion path heals by reloading the resource.
    pub fn delete(
        &self,
        container: &Arc<Container>,
        mode: DeletionMode,
        from_position: Option<u64>,
    ) -> SyncResult<()> {
        if container.is_destroyed() {
            return Ok(());
        }
        let id = container.id();
        let mut path = format!("{}?mode={}", self.config.resource_path(&id), mode);
        if let Some(position) = from_position {
            path.push_str(&format!("&from_position={position}"));
        }

        debug!(%id, %mode, "dispatching delete");
        self.transport
            .dispatch(RequestDescriptor::new(Method::Delete, path, id))?;
        self.teardown(container);
        Ok(())
    }

    fn apply_local_patch(&self, container: &Arc<Container>, ops: Vec<PatchOp>) -> SyncResult<()> {
        if container.is_destroyed() || ops.is_empty() {
            return Ok(());
        }

        // Optimistic local application; validation failures surface
        // before any mutation or network traffic
        let changes = container.apply_patch_ops(&ops)?;
        for change in changes {
            self.events.enqueue(ContainerEvent::PropertyChanged {
                container_id: container.id(),
                property: change.property,
                old_value: change.old_value,
                new_value: change.new_value,
            });
        }

        let state = container.sync_state();
        if !state.sends_patch_requests() {
            debug!(id = %container.id(), ?state, "patch kept local until create resolves");
            return Ok(());
        }
        if state == SyncState::Synced {
            container.set_sync_state(SyncState::SavingPatch);
        }

        let id = container.id();
        let request = RequestDescriptor::new(Method::Patch, self.config.resource_path(&id), id)
            .with_header("content-type", PATCH_CONTENT_TYPE)
            .with_body(serde_json::to_value(&ops)?);
        debug!(id = %container.id(), ops = ops.len(), "dispatching patch");
        self.transport.dispatch(request)
    }

    /// Removes the container from the registry and marks it destroyed.
    pub(crate) fn teardown(&self, container: &Arc<Container>) {
        self.registry.remove(&container.id());
        container.mark_destroyed();
    }

    /// Dispatches a reload of the resource to re-derive ground truth.
    pub(crate) fn dispatch_reload(&self, container: &Arc<Container>) -> SyncResult<()> {
        let id = container.id();
        debug!(%id, "dispatching reload");
        self.transport
            .dispatch(RequestDescriptor::new(Method::Get, self.config.resource_path(&id), id))
    }
}
