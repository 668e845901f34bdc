//! Error types for the patch codec.

use thiserror::Error;

/// Result type for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors that can occur while building, validating, or applying patches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// A `set` value is not a string or a nested string map.
    #[error("invalid metadata value for {property:?}: {found}")]
    InvalidMetadataValue {
        /// Dotted path of the offending operation.
        property: String,
        /// What was found instead of a valid value.
        found: String,
    },

    /// A `set` path traverses through a leaf value.
    #[error("cannot set {property:?}: {blocked_at:?} is not a map")]
    InvalidPath {
        /// Dotted path of the offending operation.
        property: String,
        /// The segment whose value is a leaf.
        blocked_at: String,
    },
}

impl PatchError {
    /// Creates an invalid value error.
    pub fn invalid_value(property: impl Into<String>, found: impl Into<String>) -> Self {
        Self::InvalidMetadataValue {
            property: property.into(),
            found: found.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(property: impl Into<String>, blocked_at: impl Into<String>) -> Self {
        Self::InvalidPath {
            property: property.into(),
            blocked_at: blocked_at.into(),
        }
    }

    /// Attaches a property path to an error raised without one.
    pub fn at_property(self, property: impl Into<String>) -> Self {
        match self {
            Self::InvalidMetadataValue { found, .. } => Self::InvalidMetadataValue {
                property: property.into(),
                found,
            },
            Self::InvalidPath { blocked_at, .. } => Self::InvalidPath {
                property: property.into(),
                blocked_at,
            },
        }
    }
}
