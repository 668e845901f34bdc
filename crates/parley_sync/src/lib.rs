//! # Parley Sync Engine
//!
//! Client-side synchronization core for container resources.
//!
//! This crate provides:
//! - The [`SyncEngine`] driving the per-container sync state machine
//! - Optimistic metadata patching with server PATCH requests
//! - Create reconciliation (identity remap, conflict recovery,
//!   `Created`/`Found`/`FoundWithMismatch` classification)
//! - Server-pushed patch and delete processing
//! - The [`Transport`] collaborator abstraction
//!
//! ## Architecture
//!
//! Local mutations are applied **optimistically**: the entity changes
//! and its notifications are queued before any network traffic. The
//! engine then shapes a request descriptor for the transport and
//! returns; the host later feeds the structured result back through the
//! `complete_*` entry points, where the reconciliation and delta paths
//! finalize, conflict-resolve, or roll back local state.
//!
//! ## Key Invariants
//!
//! - `RequestStarted` precedes its paired `RequestEnded` per correlation
//!   id, and `RequestEnded` fires even on failure
//! - An identity-remap notification precedes the completion it
//!   accompanies, and the registry reflects the new id first
//! - Completion handlers discard results for destroyed entities;
//!   in-flight requests race local teardown harmlessly

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod delta;
mod engine;
mod error;
mod reconcile;
mod transport;

pub use config::SyncConfig;
pub use delta::{DeletionMode, MemoryPurger, MessagePurger};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use reconcile::RequestResult;
pub use transport::{Method, MockTransport, RequestDescriptor, Transport};
