//! Entity directory: one materialized instance per key.
//!
//! Contacts are the motivating case: the same person shows up as a friend,
//! as a post actor, as a comment author and as a photo owner. Every one of
//! those paths resolves through the directory so observers of one see edits
//! made through any other.

use crate::entity::{ChangeSet, Mergeable, Shared, Tracked};
use crate::error::{StoreError, StoreResult};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use socialite_types::EntityId;
use std::collections::HashMap;
use tracing::{debug, error};

/// How [`EntityDirectory::resolve`] satisfied a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<F> {
    /// A new instance was registered.
    Created,
    /// An existing instance absorbed the incoming revision.
    Merged(ChangeSet<F>),
}

/// Process-wide map from key to canonical instance.
///
/// Lookups share a read lock. Check-then-insert goes through an upgradeable
/// read, of which only one can be held at a time, so two callers can never
/// both observe "absent" and both insert.
pub struct EntityDirectory<T: Mergeable> {
    entries: RwLock<HashMap<EntityId, Shared<T>>>,
}

impl<T: Mergeable> Default for EntityDirectory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Mergeable> EntityDirectory<T> {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up an instance.
    pub fn get(&self, id: &EntityId) -> Option<Shared<T>> {
        self.entries.read().get(id).cloned()
    }

    /// Returns true if the id is registered.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All registered ids, in no particular order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.read().keys().cloned().collect()
    }

    /// Returns the resident instance for `id`, or registers the one built by
    /// `factory`. The factory runs at most once per id.
    pub fn get_or_create(
        &self,
        id: &EntityId,
        factory: impl FnOnce() -> T,
    ) -> StoreResult<Shared<T>> {
        let (entity, _) = self.insert_with(id, || {
            let value = factory();
            if value.key() != id {
                error!(expected = %id, found = %value.key(), "factory produced a foreign key");
                return Err(StoreError::KeyMismatch {
                    expected: id.clone(),
                    found: value.key().clone(),
                });
            }
            Ok(Tracked::new(value))
        })?;
        Ok(entity)
    }

    /// Registers `item`, or merges it into the resident instance.
    pub fn resolve(&self, item: T) -> StoreResult<(Shared<T>, Resolution<T::Field>)> {
        let id = item.key().clone();
        let mut slot = Some(item);
        let (entity, created) = self.insert_with(&id, || {
            let item = slot.take().ok_or_else(|| StoreError::NotFound(id.clone()))?;
            Ok(Tracked::new(item))
        })?;
        match slot {
            Some(item) if !created => {
                let changes = entity.merge(item)?;
                Ok((entity, Resolution::Merged(changes)))
            }
            _ => Ok((entity, Resolution::Created)),
        }
    }

    /// Shorthand for [`resolve`](Self::resolve) that drops the resolution.
    pub fn register(&self, item: T) -> StoreResult<Shared<T>> {
        self.resolve(item).map(|(entity, _)| entity)
    }

    /// Merges `incoming` into the resident instance for `id`.
    pub fn merge_into(&self, id: &EntityId, incoming: T) -> StoreResult<ChangeSet<T::Field>> {
        if incoming.key() != id {
            error!(expected = %id, found = %incoming.key(), "merge across different keys");
            return Err(StoreError::KeyMismatch {
                expected: id.clone(),
                found: incoming.key().clone(),
            });
        }
        let entity = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entity.merge(incoming)
    }

    /// Inserts an already-materialized instance unless the id is taken.
    /// Returns the resident instance either way.
    pub fn adopt(&self, entity: Shared<T>) -> StoreResult<Shared<T>> {
        let id = entity.id().clone();
        let (resident, _) = self.insert_with(&id, || Ok(entity))?;
        Ok(resident)
    }

    fn insert_with(
        &self,
        id: &EntityId,
        make: impl FnOnce() -> StoreResult<Shared<T>>,
    ) -> StoreResult<(Shared<T>, bool)> {
        if !id.is_valid() {
            error!("directory lookup with an invalid key");
            return Err(StoreError::InvalidKey { position: 0 });
        }
        if let Some(existing) = self.entries.read().get(id) {
            return Ok((existing.clone(), false));
        }

        let entries = self.entries.upgradable_read();
        if let Some(existing) = entries.get(id) {
            return Ok((existing.clone(), false));
        }
        let entity = make()?;
        let mut entries = RwLockUpgradableReadGuard::upgrade(entries);
        entries.insert(id.clone(), entity.clone());
        debug!(id = %id, "registered entity");
        Ok((entity, true))
    }

    /// Drops the instance for `id`. Holders of the handle keep it alive.
    pub fn remove(&self, id: &EntityId) -> Option<Shared<T>> {
        self.entries.write().remove(id)
    }

    /// Drops every instance (session end).
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
