//! Patch operations and their wire form.

use serde::{Deserialize, Serialize};

/// Content type for PATCH request bodies.
pub const PATCH_CONTENT_TYPE: &str = "application/vnd.layer-patch+json";

/// Kind of patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    /// Write a value at the addressed path.
    Set,
    /// Remove the value at the addressed path.
    Delete,
}

/// A single addressed mutation of a metadata tree.
///
/// Serializes to the wire form
/// `{"operation": "set"|"delete", "property": "metadata.<path>", "value"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// What to do at the addressed path.
    pub operation: PatchOperation,
    /// Dotted path, rooted under `metadata`.
    pub property: String,
    /// Value for `set` operations; absent for `delete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl PatchOp {
    /// Creates a `set` operation with a normalized property path.
    pub fn set(property: impl AsRef<str>, value: serde_json::Value) -> Self {
        Self {
            operation: PatchOperation::Set,
            property: normalize_property(property.as_ref()),
            value: Some(value),
        }
    }

    /// Creates a `delete` operation with a normalized property path.
    pub fn delete(property: impl AsRef<str>) -> Self {
        Self {
            operation: PatchOperation::Delete,
            property: normalize_property(property.as_ref()),
            value: None,
        }
    }

    /// Returns the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.property.split('.')
    }

    /// Returns the scope of this operation: the root segment plus the
    /// first segment beneath it (`"metadata.colors"` for
    /// `"metadata.colors.background"`).
    pub fn scope(&self) -> String {
        self.segments().take(2).collect::<Vec<_>>().join(".")
    }
}

/// Roots a path under `metadata` unless it already is. Idempotent.
pub fn normalize_property(path: &str) -> String {
    if path == "metadata" || path.starts_with("metadata.") {
        path.to_string()
    } else {
        format!("metadata.{path}")
    }
}

/// Builds one `set` operation per entry, preserving input order.
pub fn build_set_ops<K, I>(entries: I) -> Vec<PatchOp>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
{
    entries
        .into_iter()
        .map(|(path, value)| PatchOp::set(path, value))
        .collect()
}

/// Builds one `delete` operation per path, preserving input order.
pub fn build_delete_ops<K, I>(paths: I) -> Vec<PatchOp>
where
    K: AsRef<str>,
    I: IntoIterator<Item = K>,
{
    paths.into_iter().map(PatchOp::delete).collect()
}
