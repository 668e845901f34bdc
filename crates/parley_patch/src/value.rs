//! Metadata value tree.

use crate::error::{PatchError, PatchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A string-keyed metadata tree.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// A value in a container's metadata tree.
///
/// Leaves are always text; everything else nests further maps. Numbers,
/// booleans, arrays, and null are not representable and are rejected at
/// the [`MetadataValue::from_json`] boundary before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A text leaf.
    Text(String),
    /// A nested mapping.
    Map(MetadataMap),
}

impl MetadataValue {
    /// Creates a text leaf.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the text content, if this is a leaf.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Map(_) => None,
        }
    }

    /// Returns the nested map, if this is one.
    pub fn as_map(&self) -> Option<&MetadataMap> {
        match self {
            Self::Text(_) => None,
            Self::Map(map) => Some(map),
        }
    }

    /// Converts a JSON value, rejecting disallowed leaf types.
    ///
    /// The returned error carries no property path; callers attach one
    /// with [`PatchError::at_property`].
    pub fn from_json(value: &serde_json::Value) -> PatchResult<Self> {
        match value {
            serde_json::Value::String(text) => Ok(Self::Text(text.clone())),
            serde_json::Value::Object(fields) => {
                let mut map = MetadataMap::new();
                for (key, nested) in fields {
                    map.insert(key.clone(), Self::from_json(nested)?);
                }
                Ok(Self::Map(map))
            }
            other => Err(PatchError::invalid_value("", json_kind(other))),
        }
    }

    /// Converts back to the JSON form. Loss-free.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Map(map) => map_to_json(map),
        }
    }
}

/// Converts a JSON object into a validated metadata map.
pub fn map_from_json(value: &serde_json::Value) -> PatchResult<MetadataMap> {
    match MetadataValue::from_json(value)? {
        MetadataValue::Map(map) => Ok(map),
        MetadataValue::Text(_) => Err(PatchError::invalid_value("", "bare string")),
    }
}

/// Converts a metadata map to its JSON object form.
pub fn map_to_json(map: &MetadataMap) -> serde_json::Value {
    let fields = map
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    serde_json::Value::Object(fields)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
