//! # Parley Core
//!
//! Entity layer for the Parley sync client.
//!
//! This crate provides:
//! - The [`Container`] entity (conversation/channel-like resource) with
//!   optimistic, interior-mutable state
//! - The [`SyncState`] lifecycle gating which operations are legal
//! - The id-indexed [`Registry`] of live containers
//! - The deferred [`EventBus`] that dispatches ordered, deduplicated
//!   change notifications after the current unit of work unwinds
//!
//! ## Key Invariants
//!
//! - A container's id is re-assigned at most once, at creation
//!   reconciliation
//! - A destroyed container silently ignores every further mutation
//! - Events reach subscribers only on [`EventBus::flush`], in FIFO order

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod container;
mod error;
mod event;
mod registry;
mod state;

pub use container::{
    Container, ContainerBuilder, ContainerId, MetadataScopeChange, TrackedProperty,
    CONTAINER_KIND,
};
pub use error::{CoreError, CoreResult};
pub use event::{ContainerEvent, CreateOutcome, EventBus};
pub use registry::Registry;
pub use state::SyncState;
