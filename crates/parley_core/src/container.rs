//! The synchronizable container entity.

use crate::error::{CoreError, CoreResult};
use crate::event::{ContainerEvent, EventBus};
use crate::state::SyncState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use parley_patch::{apply_ops, map_from_json, map_to_json, MetadataMap, MetadataValue, PatchOp};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Identifier of a container.
///
/// Provisional ids are uuid-v4 strings; creation reconciliation
/// re-assigns the server id exactly once.
pub type ContainerId = String;

/// Resource kind segment used in request paths and request types.
pub const CONTAINER_KIND: &str = "conversations";

/// Properties whose writes run through the change-dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedProperty {
    /// The container id.
    Id,
    /// The server-assigned resource locator.
    Url,
    /// Creation timestamp.
    CreatedAt,
    /// The participant set.
    Participants,
    /// The metadata tree.
    Metadata,
    /// Whether the local user is still a participant.
    IsCurrentParticipant,
    /// Server-authoritative message count.
    TotalMessageCount,
}

impl TrackedProperty {
    /// The property name carried on change events.
    pub fn name(&self) -> &'static str {
        match self {
            TrackedProperty::Id => "id",
            TrackedProperty::Url => "url",
            TrackedProperty::CreatedAt => "created_at",
            TrackedProperty::Participants => "participants",
            TrackedProperty::Metadata => "metadata",
            TrackedProperty::IsCurrentParticipant => "is_current_participant",
            TrackedProperty::TotalMessageCount => "total_message_count",
        }
    }
}

/// Change captured for one top-level metadata scope during local patch
/// application.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataScopeChange {
    /// Scoped property name (`"metadata.colors"`).
    pub property: String,
    /// Subtree value before the batch, if the scope existed.
    pub old_value: Option<serde_json::Value>,
    /// Subtree value after the batch, if the scope still exists.
    pub new_value: Option<serde_json::Value>,
}

#[derive(Debug)]
struct ContainerInner {
    id: ContainerId,
    url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    participants: Vec<String>,
    distinct: bool,
    metadata: MetadataMap,
    sync_state: SyncState,
    is_current_participant: bool,
    total_message_count: u64,
}

/// A synchronizable conversation/channel-like resource.
///
/// The mutable record sits behind one lock; the terminal and
/// suppression flags are atomics so completion handlers racing local
/// teardown can check them without contending for the record.
pub struct Container {
    inner: RwLock<ContainerInner>,
    destroyed: AtomicBool,
    patching: AtomicBool,
    events: Arc<EventBus>,
}

impl Container {
    /// Starts building a container wired to the given bus.
    pub fn builder(events: Arc<EventBus>) -> ContainerBuilder {
        ContainerBuilder::new(events)
    }

    /// Returns the current id.
    pub fn id(&self) -> ContainerId {
        self.inner.read().id.clone()
    }

    /// Returns the server-assigned resource locator, if synced.
    pub fn url(&self) -> Option<String> {
        self.inner.read().url.clone()
    }

    /// Returns the creation timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().created_at
    }

    /// Returns the participant set.
    pub fn participants(&self) -> Vec<String> {
        self.inner.read().participants.clone()
    }

    /// Returns true if this is a distinct resource (unique per
    /// participant set).
    pub fn is_distinct(&self) -> bool {
        self.inner.read().distinct
    }

    /// Returns a copy of the metadata tree.
    pub fn metadata(&self) -> MetadataMap {
        self.inner.read().metadata.clone()
    }

    /// Returns the metadata tree in its JSON form.
    pub fn metadata_json(&self) -> serde_json::Value {
        map_to_json(&self.inner.read().metadata)
    }

    /// Returns the current sync state.
    pub fn sync_state(&self) -> SyncState {
        self.inner.read().sync_state
    }

    /// Returns false once the local user was removed server-side.
    pub fn is_current_participant(&self) -> bool {
        self.inner.read().is_current_participant
    }

    /// Returns the server-authoritative message count.
    pub fn total_message_count(&self) -> u64 {
        self.inner.read().total_message_count
    }

    /// Returns true once the container is torn down. Terminal.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Returns true while the patch codec is writing through this
    /// entity.
    pub fn is_patching(&self) -> bool {
        self.patching.load(Ordering::SeqCst)
    }

    /// The bus this container emits on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Sets the sync state. Silent no-op once destroyed.
    pub fn set_sync_state(&self, state: SyncState) {
        if self.is_destroyed() {
            return;
        }
        self.inner.write().sync_state = state;
    }

    /// Sets the creation timestamp if absent. Silent no-op once
    /// destroyed.
    pub fn ensure_created_at(&self, now: DateTime<Utc>) {
        if self.is_destroyed() {
            return;
        }
        let mut inner = self.inner.write();
        if inner.created_at.is_none() {
            inner.created_at = Some(now);
        }
    }

    /// Re-assigns the id and records the identity change.
    ///
    /// Registry remapping is the caller's responsibility and must happen
    /// before observers of the enqueued `id` event can run.
    pub fn set_id(&self, new_id: impl Into<String>) {
        if self.is_destroyed() {
            return;
        }
        let new_id = new_id.into();
        let old_id = {
            let mut inner = self.inner.write();
            if inner.id == new_id {
                return;
            }
            mem::replace(&mut inner.id, new_id.clone())
        };
        self.record_change(
            TrackedProperty::Id,
            Some(serde_json::Value::String(old_id)),
            Some(serde_json::Value::String(new_id)),
        );
    }

    /// The body of a create request for this container.
    pub fn create_payload(&self) -> serde_json::Value {
        let inner = self.inner.read();
        serde_json::json!({
            "participants": inner.participants,
            "distinct": inner.distinct,
            "metadata": map_to_json(&inner.metadata),
        })
    }

    /// Applies a patch batch to the metadata tree.
    ///
    /// The suppression flag is held for the duration so the generic
    /// change hook does not re-interpret the codec's writes. Returns one
    /// entry per distinct top-level scope touched, in first-touch order,
    /// with the subtree values before and after the batch. Silent no-op
    /// (empty result) once destroyed.
    pub fn apply_patch_ops(&self, ops: &[PatchOp]) -> CoreResult<Vec<MetadataScopeChange>> {
        if self.is_destroyed() {
            return Ok(Vec::new());
        }

        let mut scopes: Vec<String> = Vec::new();
        for op in ops {
            let scope = op.scope();
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        self.patching.store(true, Ordering::SeqCst);
        let applied = {
            let mut inner = self.inner.write();
            let mut root = MetadataMap::new();
            root.insert(
                "metadata".to_string(),
                MetadataValue::Map(mem::take(&mut inner.metadata)),
            );

            let old_values: Vec<Option<serde_json::Value>> =
                scopes.iter().map(|scope| scope_value(&root, scope)).collect();
            let applied = apply_ops(&mut root, ops);
            let new_values: Vec<Option<serde_json::Value>> =
                scopes.iter().map(|scope| scope_value(&root, scope)).collect();

            inner.metadata = match root.remove("metadata") {
                Some(MetadataValue::Map(map)) => map,
                _ => MetadataMap::new(),
            };

            applied.map(|()| {
                scopes
                    .into_iter()
                    .zip(old_values)
                    .zip(new_values)
                    .map(|((property, old_value), new_value)| MetadataScopeChange {
                        property,
                        old_value,
                        new_value,
                    })
                    .collect()
            })
        };
        self.patching.store(false, Ordering::SeqCst);

        Ok(applied?)
    }

    /// Merges server-authoritative fields onto this entity.
    ///
    /// Recognized fields: `url`, `created_at` (RFC 3339), `participants`,
    /// `distinct`, `metadata`, `total_message_count`,
    /// `is_current_participant`. The id is never merged here; identity
    /// re-assignment goes through [`Container::set_id`] so the caller
    /// controls its ordering against the registry remap. Each changed
    /// field is recorded through the change-dispatch table. Silent no-op
    /// once destroyed.
    pub fn merge_server_state(&self, data: &serde_json::Value) -> CoreResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let fields = data
            .as_object()
            .ok_or_else(|| CoreError::InvalidPayload("expected an object".to_string()))?;

        let mut changes: Vec<(TrackedProperty, Option<serde_json::Value>, Option<serde_json::Value>)> =
            Vec::new();
        {
            let mut inner = self.inner.write();

            if let Some(url) = fields.get("url").and_then(|v| v.as_str()) {
                if inner.url.as_deref() != Some(url) {
                    changes.push((
                        TrackedProperty::Url,
                        inner.url.take().map(serde_json::Value::String),
                        Some(serde_json::Value::String(url.to_string())),
                    ));
                    inner.url = Some(url.to_string());
                }
            }

            if let Some(raw) = fields.get("created_at").and_then(|v| v.as_str()) {
                match DateTime::parse_from_rfc3339(raw) {
                    Ok(parsed) => {
                        let stamp = parsed.with_timezone(&Utc);
                        if inner.created_at != Some(stamp) {
                            changes.push((
                                TrackedProperty::CreatedAt,
                                inner
                                    .created_at
                                    .map(|t| serde_json::Value::String(t.to_rfc3339())),
                                Some(serde_json::Value::String(stamp.to_rfc3339())),
                            ));
                            inner.created_at = Some(stamp);
                        }
                    }
                    Err(error) => {
                        warn!(%error, created_at = raw, "ignoring unparseable created_at");
                    }
                }
            }

            if let Some(raw) = fields.get("participants").and_then(|v| v.as_array()) {
                let participants: Vec<String> = raw
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if participants != inner.participants {
                    changes.push((
                        TrackedProperty::Participants,
                        Some(serde_json::json!(inner.participants)),
                        Some(serde_json::json!(participants)),
                    ));
                    inner.participants = participants;
                }
            }

            if let Some(distinct) = fields.get("distinct").and_then(|v| v.as_bool()) {
                inner.distinct = distinct;
            }

            if let Some(raw) = fields.get("metadata") {
                let metadata = map_from_json(raw)?;
                if metadata != inner.metadata {
                    changes.push((
                        TrackedProperty::Metadata,
                        Some(map_to_json(&inner.metadata)),
                        Some(map_to_json(&metadata)),
                    ));
                    inner.metadata = metadata;
                }
            }

            if let Some(count) = fields.get("total_message_count").and_then(|v| v.as_u64()) {
                if count != inner.total_message_count {
                    changes.push((
                        TrackedProperty::TotalMessageCount,
                        Some(serde_json::json!(inner.total_message_count)),
                        Some(serde_json::json!(count)),
                    ));
                    inner.total_message_count = count;
                }
            }

            if let Some(current) = fields
                .get("is_current_participant")
                .and_then(|v| v.as_bool())
            {
                if current != inner.is_current_participant {
                    changes.push((
                        TrackedProperty::IsCurrentParticipant,
                        Some(serde_json::json!(inner.is_current_participant)),
                        Some(serde_json::json!(current)),
                    ));
                    inner.is_current_participant = current;
                }
            }
        }

        for (property, old_value, new_value) in changes {
            self.record_change(property, old_value, new_value);
        }
        Ok(())
    }

    /// Marks the container destroyed and records the teardown.
    ///
    /// Returns true the first time; later calls are no-ops.
    pub fn mark_destroyed(&self) -> bool {
        let newly = !self.destroyed.swap(true, Ordering::SeqCst);
        if newly {
            self.events.enqueue(ContainerEvent::Destroyed {
                container_id: self.id(),
            });
        }
        newly
    }

    /// The change-dispatch hook invoked for every tracked property
    /// write.
    ///
    /// Suppressed while destroyed or while the patch codec holds the
    /// reentrancy guard, and for writes that do not change the value.
    fn record_change(
        &self,
        property: TrackedProperty,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) {
        if self.is_destroyed() || self.is_patching() {
            return;
        }
        if old_value == new_value {
            return;
        }
        self.events.enqueue(ContainerEvent::PropertyChanged {
            container_id: self.id(),
            property: property.name().to_string(),
            old_value,
            new_value,
        });
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Container")
            .field("id", &inner.id)
            .field("sync_state", &inner.sync_state)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Container`].
pub struct ContainerBuilder {
    events: Arc<EventBus>,
    id: Option<ContainerId>,
    participants: Vec<String>,
    distinct: bool,
    metadata: MetadataMap,
}

impl ContainerBuilder {
    /// Creates a builder wired to the given bus.
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            events,
            id: None,
            participants: Vec::new(),
            distinct: false,
            metadata: MetadataMap::new(),
        }
    }

    /// Overrides the provisional id.
    pub fn with_id(mut self, id: impl Into<ContainerId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the participant set.
    pub fn with_participants(mut self, participants: Vec<String>) -> Self {
        self.participants = participants;
        self
    }

    /// Marks the container distinct (unique per participant set).
    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Sets the initial metadata tree.
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builds the container in `New` state with a provisional id.
    pub fn build(self) -> Arc<Container> {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        Arc::new(Container {
            inner: RwLock::new(ContainerInner {
                id,
                url: None,
                created_at: Some(Utc::now()),
                participants: self.participants,
                distinct: self.distinct,
                metadata: self.metadata,
                sync_state: SyncState::New,
                is_current_participant: true,
                total_message_count: 0,
            }),
            destroyed: AtomicBool::new(false),
            patching: AtomicBool::new(false),
            events: self.events,
        })
    }
}

fn scope_value(root: &MetadataMap, scope: &str) -> Option<serde_json::Value> {
    let mut segments = scope.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?;
    for segment in segments {
        current = current.as_map()?.get(segment)?;
    }
    Some(current.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_patch::{build_delete_ops, build_set_ops};
    use serde_json::json;

    fn make(id: &str) -> (Arc<EventBus>, Arc<Container>) {
        let bus = Arc::new(EventBus::new());
        let container = Container::builder(Arc::clone(&bus)).with_id(id).build();
        (bus, container)
    }

    #[test]
    fn builder_defaults() {
        let bus = Arc::new(EventBus::new());
        let container = Container::builder(bus).build();

        assert_eq!(container.sync_state(), SyncState::New);
        assert!(container.is_current_participant());
        assert_eq!(container.total_message_count(), 0);
        assert!(container.url().is_none());
        assert!(container.created_at().is_some());
        assert!(!container.id().is_empty());
        assert!(!container.is_destroyed());
    }

    #[test]
    fn provisional_ids_are_unique() {
        let bus = Arc::new(EventBus::new());
        let a = Container::builder(Arc::clone(&bus)).build();
        let b = Container::builder(bus).build();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn set_id_records_identity_change() {
        let (bus, container) = make("local-1");
        let rx = bus.subscribe();

        container.set_id("server-9");
        assert_eq!(container.id(), "server-9");

        bus.flush();
        let events: Vec<ContainerEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ContainerEvent::PropertyChanged {
                property,
                old_value,
                new_value,
                ..
            } => {
                assert_eq!(property, "id");
                assert_eq!(old_value, &Some(json!("local-1")));
                assert_eq!(new_value, &Some(json!("server-9")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn set_id_to_same_value_is_silent() {
        let (bus, container) = make("c1");
        container.set_id("c1");
        assert_eq!(bus.pending_len(), 0);
    }

    #[test]
    fn apply_patch_ops_reports_scopes_in_first_touch_order() {
        let (_bus, container) = make("c1");
        let ops = build_set_ops(vec![
            ("colors.background", json!("blue")),
            ("title", json!("hello")),
            ("colors.accent", json!("gold")),
        ]);

        let changes = container.apply_patch_ops(&ops).unwrap();
        let scopes: Vec<&str> = changes.iter().map(|c| c.property.as_str()).collect();
        assert_eq!(scopes, vec!["metadata.colors", "metadata.title"]);

        assert_eq!(changes[0].old_value, None);
        assert_eq!(
            changes[0].new_value,
            Some(json!({ "background": "blue", "accent": "gold" }))
        );
        assert_eq!(
            container.metadata_json(),
            json!({
                "colors": { "background": "blue", "accent": "gold" },
                "title": "hello"
            })
        );
    }

    #[test]
    fn apply_patch_ops_captures_deletions() {
        let (_bus, container) = make("c1");
        container
            .apply_patch_ops(&build_set_ops(vec![("title", json!("hello"))]))
            .unwrap();

        let changes = container
            .apply_patch_ops(&build_delete_ops(vec!["title"]))
            .unwrap();
        assert_eq!(changes[0].old_value, Some(json!("hello")));
        assert_eq!(changes[0].new_value, None);
        assert_eq!(container.metadata_json(), json!({}));
    }

    #[test]
    fn apply_patch_ops_on_destroyed_container_is_noop() {
        let (_bus, container) = make("c1");
        container.mark_destroyed();

        let changes = container
            .apply_patch_ops(&build_set_ops(vec![("a", json!("1"))]))
            .unwrap();
        assert!(changes.is_empty());
        assert_eq!(container.metadata_json(), json!({}));
    }

    #[test]
    fn invalid_patch_value_leaves_metadata_unchanged() {
        let (_bus, container) = make("c1");
        container
            .apply_patch_ops(&build_set_ops(vec![("title", json!("hello"))]))
            .unwrap();

        let err = container
            .apply_patch_ops(&build_set_ops(vec![("count", json!(3))]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Patch(_)));
        assert_eq!(container.metadata_json(), json!({ "title": "hello" }));
    }

    #[test]
    fn merge_server_state_records_changes() {
        let (bus, container) = make("c1");
        let rx = bus.subscribe();

        container
            .merge_server_state(&json!({
                "url": "/c/9",
                "metadata": { "a": "1" },
                "total_message_count": 7,
            }))
            .unwrap();

        assert_eq!(container.url().as_deref(), Some("/c/9"));
        assert_eq!(container.metadata_json(), json!({ "a": "1" }));
        assert_eq!(container.total_message_count(), 7);

        bus.flush();
        let properties: Vec<String> = rx
            .try_iter()
            .map(|event| match event {
                ContainerEvent::PropertyChanged { property, .. } => property,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(properties, vec!["url", "metadata", "total_message_count"]);
    }

    #[test]
    fn merge_server_state_ignores_id_field() {
        let (_bus, container) = make("local-1");
        container
            .merge_server_state(&json!({ "id": "server-9", "url": "/c/9" }))
            .unwrap();
        assert_eq!(container.id(), "local-1");
    }

    #[test]
    fn merge_server_state_rejects_non_object() {
        let (_bus, container) = make("c1");
        assert!(container.merge_server_state(&json!("nope")).is_err());
    }

    #[test]
    fn mark_destroyed_is_terminal_and_single_shot() {
        let (bus, container) = make("c1");
        let rx = bus.subscribe();

        assert!(container.mark_destroyed());
        assert!(!container.mark_destroyed());
        assert!(container.is_destroyed());

        // Mutations after teardown are silently ignored
        container.set_id("other");
        assert_eq!(container.id(), "c1");
        container.set_sync_state(SyncState::Synced);
        assert_eq!(container.sync_state(), SyncState::New);
        container.merge_server_state(&json!({ "url": "/x" })).unwrap();
        assert!(container.url().is_none());

        bus.flush();
        let events: Vec<ContainerEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![ContainerEvent::Destroyed {
                container_id: "c1".to_string()
            }]
        );
    }
}
