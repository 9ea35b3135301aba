//! Identity-keyed entity store for Socialite.
//!
//! This crate holds the merge engine every synchronized collection is built
//! on:
//!
//! - [`Mergeable`]: the contract a synchronizable entity implements: expose
//!   its key, merge a fresh revision of itself in place
//! - [`Tracked<T>`] / [`Shared<T>`]: the single canonical instance of an
//!   entity, with typed field-change notifications
//! - [`MergeableCollection<T>`]: ordered, key-unique collection with
//!   insert-or-merge, custom sort and bounded capacity
//! - [`EntityDirectory<T>`]: one materialized instance per key, shared by
//!   every collection that references the entity
//!
//! Merging is idempotent: applying the same batch twice leaves the same
//! observable state and the second pass emits no field changes.

mod collection;
mod directory;
mod entity;
mod error;
mod events;

pub use collection::{Comparison, MergeOptions, MergeReport, MergeableCollection};
pub use directory::{EntityDirectory, Resolution};
pub use entity::{repair_keys, ChangeSet, Mergeable, MutationGuard, Shared, Tracked};
pub use error::{StoreError, StoreResult};
pub use events::CollectionEvent;
