//! Container sync lifecycle states.

/// The sync lifecycle of a single container.
///
/// `New → Syncing → Synced`, with a `Synced ⇄ SavingPatch` sub-cycle
/// while a metadata patch request is in flight. Destruction is tracked
/// separately on the entity and is terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Created locally; nothing sent to the server yet.
    New,
    /// Create request in flight.
    Syncing,
    /// Confirmed by the server.
    Synced,
    /// Metadata patch request in flight.
    SavingPatch,
}

impl SyncState {
    /// Returns true if a create request may be issued.
    pub fn can_send(&self) -> bool {
        matches!(self, SyncState::New)
    }

    /// Returns true once the server has confirmed the resource.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced | SyncState::SavingPatch)
    }

    /// Returns true if metadata edits should dispatch PATCH requests.
    ///
    /// Edits made before the create resolves stay local-only; they ride
    /// along with the create body or a later reload.
    pub fn sends_patch_requests(&self) -> bool {
        matches!(self, SyncState::Synced | SyncState::SavingPatch)
    }
}
