//! The mergeable-entity contract and the canonical entity handle.

use crate::error::{StoreError, StoreResult};
use crate::events::CollectionEvent;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use socialite_types::EntityId;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

const FIELD_CHANNEL_CAPACITY: usize = 64;

/// Capability every synchronizable entity implements.
pub trait Mergeable: Clone + Send + Sync + 'static {
    /// Tagged field-change notification for this entity kind.
    type Field: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The stable primary key.
    fn key(&self) -> &EntityId;

    /// Copies the authoritative fields of `incoming` onto `self`, merging
    /// nested collections recursively. Returns the fields whose value
    /// actually changed; merging an identical revision returns an empty set.
    ///
    /// Callers guarantee `incoming.key() == self.key()`.
    fn merge_from(&mut self, incoming: Self) -> ChangeSet<Self::Field>;

    /// Replaces the key of a record that has not been materialized yet.
    /// Only used to repair upstream records that arrived without one.
    fn repair_key(&mut self, id: EntityId);
}

/// Assigns a synthesized key to every record whose key is invalid.
/// Returns the number of repaired records.
pub fn repair_keys<T: Mergeable>(items: &mut [T]) -> usize {
    let mut repaired = 0;
    for item in items.iter_mut().filter(|i| !i.key().is_valid()) {
        let id = EntityId::synthesize();
        warn!(assigned = %id, "record arrived without a key; assigning a local one");
        item.repair_key(id);
        repaired += 1;
    }
    repaired
}

/// The set of fields a merge or local mutation changed, in change order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<F> {
    fields: Vec<F>,
}

impl<F> Default for ChangeSet<F> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<F: Copy + Eq> ChangeSet<F> {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` into `slot` and records `field` if the value differs.
    pub fn update<V: PartialEq>(&mut self, slot: &mut V, value: V, field: F) {
        if *slot != value {
            *slot = value;
            self.record(field);
        }
    }

    /// Records a changed field (once).
    pub fn record(&mut self, field: F) {
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    /// Returns true if the field was changed.
    pub fn contains(&self, field: F) -> bool {
        self.fields.contains(&field)
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over the changed fields.
    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        self.fields.iter().copied()
    }
}

/// Shared handle to the single canonical instance of an entity.
pub type Shared<T> = Arc<Tracked<T>>;

struct Sink<F> {
    id: u64,
    events: broadcast::Sender<CollectionEvent<F>>,
}

/// A canonical entity instance plus its change channel.
///
/// Every holder of a [`Shared<T>`] observes merges and local mutations
/// applied to it; the instance is never replaced by a merge.
pub struct Tracked<T: Mergeable> {
    id: EntityId,
    state: RwLock<T>,
    changes: broadcast::Sender<T::Field>,
    sinks: Mutex<Vec<Sink<T::Field>>>,
    in_flight: AtomicBool,
}

impl<T: Mergeable> Tracked<T> {
    /// Materializes an entity.
    pub fn new(value: T) -> Shared<T> {
        let (changes, _) = broadcast::channel(FIELD_CHANNEL_CAPACITY);
        Arc::new(Self {
            id: value.key().clone(),
            state: RwLock::new(value),
            changes,
            sinks: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        })
    }

    /// The primary key.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Read access to the current state.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.state.read()
    }

    /// Runs `f` against the current state.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.read())
    }

    /// Clones the current state.
    pub fn snapshot(&self) -> T {
        self.state.read().clone()
    }

    /// Subscribes to this entity's field changes.
    pub fn subscribe(&self) -> broadcast::Receiver<T::Field> {
        self.changes.subscribe()
    }

    /// Merges a fresh revision into this instance in place.
    pub fn merge(&self, incoming: T) -> StoreResult<ChangeSet<T::Field>> {
        if incoming.key() != &self.id {
            return Err(StoreError::KeyMismatch {
                expected: self.id.clone(),
                found: incoming.key().clone(),
            });
        }
        let changes = self.state.write().merge_from(incoming);
        self.notify(&changes);
        Ok(changes)
    }

    /// Applies a local mutation. `f` records what it changed in the
    /// provided change set; those fields are then notified.
    pub fn update<R>(&self, f: impl FnOnce(&mut T, &mut ChangeSet<T::Field>) -> R) -> R {
        let mut changes = ChangeSet::new();
        let result = {
            let mut state = self.state.write();
            f(&mut *state, &mut changes)
        };
        self.notify(&changes);
        result
    }

    /// Claims the single in-flight mutation slot for this entity.
    /// Returns `None` while another mutation is outstanding.
    pub fn begin_mutation(self: &Arc<Self>) -> Option<MutationGuard<T>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| MutationGuard {
                entity: Arc::clone(self),
            })
    }

    /// Returns true while a mutation of this entity is outstanding.
    pub fn mutation_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Unwraps the state of an instance nobody else holds.
    pub fn into_inner(self) -> T {
        self.state.into_inner()
    }

    pub(crate) fn attach(&self, sink_id: u64, events: broadcast::Sender<CollectionEvent<T::Field>>) {
        let mut sinks = self.sinks.lock();
        if !sinks.iter().any(|s| s.id == sink_id) {
            sinks.push(Sink { id: sink_id, events });
        }
    }

    pub(crate) fn detach(&self, sink_id: u64) {
        self.sinks.lock().retain(|s| s.id != sink_id);
    }

    fn notify(&self, changes: &ChangeSet<T::Field>) {
        if changes.is_empty() {
            return;
        }
        let sinks = self.sinks.lock();
        for field in changes.iter() {
            // No receivers is not an error.
            let _ = self.changes.send(field);
            for sink in sinks.iter() {
                let _ = sink.events.send(CollectionEvent::ItemChanged {
                    id: self.id.clone(),
                    field,
                });
            }
        }
    }
}

impl<T: Mergeable + fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("id", &self.id)
            .field("state", &*self.state.read())
            .finish()
    }
}

/// Exclusive claim on an entity's mutation slot; released on drop.
pub struct MutationGuard<T: Mergeable> {
    entity: Shared<T>,
}

impl<T: Mergeable> MutationGuard<T> {
    /// The guarded entity.
    pub fn entity(&self) -> &Shared<T> {
        &self.entity
    }
}

impl<T: Mergeable> Drop for MutationGuard<T> {
    fn drop(&mut self) {
        self.entity.in_flight.store(false, Ordering::Release);
    }
}
