//! Ordered, key-unique collection with insert-or-merge semantics.
//!
//! A collection holds [`Shared`] handles, so merging a fresh batch updates
//! the instances observers already hold instead of replacing them. Order is
//! either insertion order or a caller-supplied comparison; a merge that
//! moves one entity re-places that entity alone.

use crate::directory::EntityDirectory;
use crate::entity::{Mergeable, Shared, Tracked};
use crate::error::{StoreError, StoreResult};
use crate::events::CollectionEvent;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use socialite_types::EntityId;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error};

const EVENT_CHANNEL_CAPACITY: usize = 256;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Presentation order over entity states.
pub type Comparison<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Per-call merge behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Remove members that were present before the merge but are absent
    /// from the batch (full-snapshot feeds).
    pub reset_missing: bool,
    /// Trim the tail down to this many members after merging.
    pub max_count: Option<usize>,
}

impl MergeOptions {
    /// Plain insert-or-merge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treats the batch as the complete membership.
    #[must_use]
    pub fn reset_missing(mut self) -> Self {
        self.reset_missing = true;
        self
    }

    /// Caps the retained size.
    #[must_use]
    pub fn max_count(mut self, max: usize) -> Self {
        self.max_count = Some(max);
        self
    }
}

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entities inserted.
    pub added: usize,
    /// Existing entities with at least one changed field.
    pub updated: usize,
    /// Entities removed because the batch no longer listed them.
    pub removed: usize,
    /// Entities evicted by the size cap.
    pub trimmed: usize,
}

impl MergeReport {
    /// Returns true if the merge changed nothing observable.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

struct Inner<T: Mergeable> {
    items: Vec<Shared<T>>,
    index: HashMap<EntityId, Shared<T>>,
    comparison: Option<Comparison<T>>,
}

/// Ordered, identity-keyed collection of entities.
pub struct MergeableCollection<T: Mergeable> {
    inner: RwLock<Inner<T>>,
    events: broadcast::Sender<CollectionEvent<T::Field>>,
    sink_id: u64,
    directory: Option<Arc<EntityDirectory<T>>>,
}

impl<T: Mergeable> Default for MergeableCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Mergeable> MergeableCollection<T> {
    /// Creates an empty, insertion-ordered collection.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                items: Vec::new(),
                index: HashMap::new(),
                comparison: None,
            }),
            events,
            sink_id: NEXT_SINK_ID.fetch_add(1, AtomicOrdering::Relaxed),
            directory: None,
        }
    }

    /// Creates an empty collection that resolves new members through
    /// `directory`, sharing instances with every other collection attached
    /// to it.
    pub fn with_directory(directory: Arc<EntityDirectory<T>>) -> Self {
        let mut collection = Self::new();
        collection.directory = Some(directory);
        collection
    }

    /// Creates an empty collection ordered by `comparison`.
    pub fn with_comparison(
        comparison: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        let collection = Self::new();
        collection.inner.write().comparison = Some(Arc::new(comparison));
        collection
    }

    /// Builds a detached collection from transient records.
    pub fn from_items(items: Vec<T>) -> StoreResult<Self> {
        let collection = Self::new();
        collection.merge(items, MergeOptions::new())?;
        Ok(collection)
    }

    /// The directory new members resolve through, if any.
    pub fn directory(&self) -> Option<&Arc<EntityDirectory<T>>> {
        self.directory.as_ref()
    }

    /// Subscribes to structural changes and forwarded member field changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent<T::Field>> {
        self.events.subscribe()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Returns true if `id` is a member.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.inner.read().index.contains_key(id)
    }

    /// Looks up a member by key. Never fails; `None` on a miss.
    pub fn find(&self, id: &EntityId) -> Option<Shared<T>> {
        self.inner.read().index.get(id).cloned()
    }

    /// The member at `index` in current order.
    pub fn get(&self, index: usize) -> Option<Shared<T>> {
        self.inner.read().items.get(index).cloned()
    }

    /// Current position of `id`.
    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.inner
            .read()
            .items
            .iter()
            .position(|item| item.id() == id)
    }

    /// Handles of every member, in order.
    pub fn snapshot(&self) -> Vec<Shared<T>> {
        self.inner.read().items.clone()
    }

    /// Keys of every member, in order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.inner
            .read()
            .items
            .iter()
            .map(|item| item.id().clone())
            .collect()
    }

    /// Cloned states of every member, in order.
    pub fn values(&self) -> Vec<T> {
        self.inner
            .read()
            .items
            .iter()
            .map(|item| item.snapshot())
            .collect()
    }

    /// Merges a batch.
    ///
    /// Members with a known key absorb the incoming revision in place; new
    /// keys are resolved through the directory (if attached) and inserted at
    /// their sorted position. An empty batch is a no-op. A batch containing
    /// an invalid key is rejected before anything is touched.
    pub fn merge(&self, items: Vec<T>, options: MergeOptions) -> StoreResult<MergeReport> {
        let mut report = MergeReport::default();
        if items.is_empty() {
            return Ok(report);
        }
        if let Some(position) = items.iter().position(|item| !item.key().is_valid()) {
            error!(position, "merge batch contains an invalid key");
            return Err(StoreError::InvalidKey { position });
        }

        let mut inner = self.inner.write();
        let previous: HashSet<EntityId> = if options.reset_missing {
            inner.index.keys().cloned().collect()
        } else {
            HashSet::new()
        };
        let mut seen = HashSet::with_capacity(items.len());

        for item in items {
            let id = item.key().clone();
            seen.insert(id.clone());
            if let Some(existing) = inner.index.get(&id).cloned() {
                let changes = existing.merge(item)?;
                if !changes.is_empty() {
                    report.updated += 1;
                    self.reposition(&mut inner, &existing);
                }
            } else {
                let entity = match &self.directory {
                    Some(directory) => directory.register(item)?,
                    None => Tracked::new(item),
                };
                self.insert_entity(&mut inner, entity);
                report.added += 1;
            }
        }

        if options.reset_missing {
            for id in previous.difference(&seen) {
                if self.remove_entity(&mut inner, id).is_some() {
                    report.removed += 1;
                }
            }
        }

        if let Some(max) = options.max_count {
            while inner.items.len() > max {
                let Some(last) = inner.items.last().map(|item| item.id().clone()) else {
                    break;
                };
                self.remove_entity(&mut inner, &last);
                report.trimmed += 1;
            }
        }

        debug!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            trimmed = report.trimmed,
            len = inner.items.len(),
            "merged batch"
        );
        Ok(report)
    }

    /// Inserts a single record, or merges it into the member with its key.
    pub fn add(&self, item: T) -> StoreResult<Shared<T>> {
        if !item.key().is_valid() {
            error!("add with an invalid key");
            return Err(StoreError::InvalidKey { position: 0 });
        }
        let mut inner = self.inner.write();
        if let Some(existing) = inner.index.get(item.key()).cloned() {
            if !existing.merge(item)?.is_empty() {
                self.reposition(&mut inner, &existing);
            }
            return Ok(existing);
        }
        let entity = match &self.directory {
            Some(directory) => directory.register(item)?,
            None => Tracked::new(item),
        };
        self.insert_entity(&mut inner, entity.clone());
        Ok(entity)
    }

    /// Inserts an already-materialized instance. Returns false if a member
    /// with the same key is present.
    pub fn add_shared(&self, entity: Shared<T>) -> StoreResult<bool> {
        if !entity.id().is_valid() {
            return Err(StoreError::InvalidKey { position: 0 });
        }
        let mut inner = self.inner.write();
        if inner.index.contains_key(entity.id()) {
            return Ok(false);
        }
        self.insert_entity(&mut inner, entity);
        Ok(true)
    }

    /// Removes a member.
    pub fn remove(&self, id: &EntityId) -> Option<Shared<T>> {
        let mut inner = self.inner.write();
        self.remove_entity(&mut inner, id)
    }

    /// Removes every member.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        for item in inner.items.drain(..) {
            item.detach(self.sink_id);
        }
        inner.index.clear();
        let _ = self.events.send(CollectionEvent::Cleared);
    }

    /// Replaces the presentation order and re-sorts.
    pub fn set_comparison(&self, comparison: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) {
        self.inner.write().comparison = Some(Arc::new(comparison));
        self.refresh_sort();
    }

    /// Reverts to insertion order for future inserts. Current order is kept.
    pub fn clear_comparison(&self) {
        self.inner.write().comparison = None;
    }

    /// Re-applies the comparison to every member. Members are reordered,
    /// never rebuilt.
    pub fn refresh_sort(&self) {
        let mut inner = self.inner.write();
        let Some(comparison) = inner.comparison.clone() else {
            return;
        };
        let before: Vec<EntityId> = inner.items.iter().map(|i| i.id().clone()).collect();
        inner.items.sort_by(|a, b| compare_entities(&comparison, a, b));
        let changed = inner
            .items
            .iter()
            .zip(before.iter())
            .any(|(item, id)| item.id() != id);
        if changed {
            let _ = self.events.send(CollectionEvent::Reordered);
        }
    }

    /// Consumes the collection, returning member states in order.
    pub fn into_items(mut self) -> Vec<T> {
        let inner = self.inner.get_mut();
        inner.index.clear();
        std::mem::take(&mut inner.items)
            .into_iter()
            .map(|entity| {
                entity.detach(self.sink_id);
                Arc::try_unwrap(entity)
                    .map(Tracked::into_inner)
                    .unwrap_or_else(|shared| shared.snapshot())
            })
            .collect()
    }

    fn insert_entity(&self, inner: &mut Inner<T>, entity: Shared<T>) {
        let index = match &inner.comparison {
            Some(comparison) => sorted_position(&inner.items, comparison, &entity),
            None => inner.items.len(),
        };
        entity.attach(self.sink_id, self.events.clone());
        inner.index.insert(entity.id().clone(), entity.clone());
        inner.items.insert(index, entity.clone());
        let _ = self.events.send(CollectionEvent::Added {
            id: entity.id().clone(),
            index,
        });
    }

    fn remove_entity(&self, inner: &mut Inner<T>, id: &EntityId) -> Option<Shared<T>> {
        let entity = inner.index.remove(id)?;
        if let Some(pos) = inner.items.iter().position(|item| Arc::ptr_eq(item, &entity)) {
            inner.items.remove(pos);
        }
        entity.detach(self.sink_id);
        let _ = self
            .events
            .send(CollectionEvent::Removed { id: id.clone() });
        Some(entity)
    }

    fn reposition(&self, inner: &mut Inner<T>, entity: &Shared<T>) {
        let Some(comparison) = inner.comparison.clone() else {
            return;
        };
        let Some(from) = inner.items.iter().position(|item| Arc::ptr_eq(item, entity)) else {
            return;
        };
        let moved = inner.items.remove(from);
        let to = sorted_position(&inner.items, &comparison, &moved);
        inner.items.insert(to, moved);
        if from != to {
            let _ = self.events.send(CollectionEvent::Moved {
                id: entity.id().clone(),
                from,
                to,
            });
        }
    }
}

fn compare_entities<T: Mergeable>(
    comparison: &Comparison<T>,
    a: &Shared<T>,
    b: &Shared<T>,
) -> Ordering {
    if Arc::ptr_eq(a, b) {
        return Ordering::Equal;
    }
    comparison(&a.read(), &b.read())
}

/// First index whose member sorts strictly after `entity`; equal members
/// keep their relative insertion order.
fn sorted_position<T: Mergeable>(
    items: &[Shared<T>],
    comparison: &Comparison<T>,
    entity: &Shared<T>,
) -> usize {
    items.partition_point(|probe| compare_entities(comparison, probe, entity) != Ordering::Greater)
}

impl<T: Mergeable> Clone for MergeableCollection<T> {
    /// Produces a detached copy: same keys, order and field values, fresh
    /// instances and no subscribers.
    fn clone(&self) -> Self {
        let inner = self.inner.read();
        let copy = Self::new();
        {
            let mut target = copy.inner.write();
            target.comparison = inner.comparison.clone();
            for item in &inner.items {
                let entity = Tracked::new(item.snapshot());
                entity.attach(copy.sink_id, copy.events.clone());
                target.index.insert(entity.id().clone(), entity.clone());
                target.items.push(entity);
            }
        }
        copy
    }
}

impl<T: Mergeable + PartialEq> PartialEq for MergeableCollection<T> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let a = self.snapshot();
        let b = other.snapshot();
        a.len() == b.len()
            && a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| Arc::ptr_eq(x, y) || *x.read() == *y.read())
    }
}

impl<T: Mergeable> fmt::Debug for MergeableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeableCollection")
            .field("ids", &self.ids())
            .field("sorted", &self.inner.read().comparison.is_some())
            .finish()
    }
}

impl<T: Mergeable + Serialize> Serialize for MergeableCollection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values())
    }
}

impl<'de, T: Mergeable + Deserialize<'de>> Deserialize<'de> for MergeableCollection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Self::from_items(items).map_err(serde::de::Error::custom)
    }
}

impl<T: Mergeable> Drop for MergeableCollection<T> {
    fn drop(&mut self) {
        for item in self.inner.get_mut().items.iter() {
            item.detach(self.sink_id);
        }
    }
}
