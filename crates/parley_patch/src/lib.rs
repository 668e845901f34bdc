//! # Parley Patch Codec
//!
//! Dotted-path patch operations for container metadata.
//!
//! This crate provides:
//! - The metadata value model (string leaves, nested string-keyed maps)
//! - Patch operation construction with `metadata.` path normalization
//! - Validation of patch values (all-or-nothing, before any mutation)
//! - Application of patch batches to an in-memory metadata tree
//! - The JSON wire form used for PATCH request bodies
//!
//! ## Key Invariants
//!
//! - Patch properties are always rooted under `metadata`; bare paths are
//!   prefixed on construction and the prefixing is idempotent
//! - A `set` with a disallowed leaf value (number, boolean, array, null)
//!   fails validation before any operation in the batch is applied
//! - A `delete` of a missing path is a no-op, never an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod error;
mod op;
mod value;

pub use apply::{apply_ops, validate_ops};
pub use error::{PatchError, PatchResult};
pub use op::{
    build_delete_ops, build_set_ops, normalize_property, PatchOp, PatchOperation,
    PATCH_CONTENT_TYPE,
};
pub use value::{map_from_json, map_to_json, MetadataMap, MetadataValue};
