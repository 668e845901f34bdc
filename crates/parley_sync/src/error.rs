//! Error types for the sync engine.

use parley_core::CoreError;
use parley_patch::PatchError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while driving sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Handing a request to the transport failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// Entity-layer failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Patch building or application failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// A wire body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
