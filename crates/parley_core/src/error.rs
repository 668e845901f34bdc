//! Error types for the entity layer.

use parley_patch::PatchError;
use thiserror::Error;

/// Result type for entity operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the entity layer.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Patch validation or application failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// A server payload had an unusable shape.
    #[error("invalid server payload: {0}")]
    InvalidPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_errors_convert() {
        let err: CoreError = PatchError::invalid_value("metadata.x", "number").into();
        assert!(matches!(err, CoreError::Patch(_)));
        assert!(err.to_string().contains("metadata.x"));
    }
}
