use crate::error::StorageResult;
use parking_lot::Mutex;
use socialite_types::EntityId;
use std::collections::{HashMap, HashSet};

/// Client state that survives restarts.
pub trait Persistence: Send + Sync {
    /// How interesting the user finds a contact, if ever recorded.
    fn interest_level(&self, id: &EntityId) -> Option<f64>;

    /// Every recorded interest level, for enriching a whole batch at once.
    fn interest_levels(&self) -> HashMap<EntityId, f64>;

    /// Records or clears a contact's interest level.
    fn set_interest_level(&self, id: &EntityId, level: Option<f64>) -> StorageResult<()>;

    /// Friends seen by an earlier refresh. `None` before the first one.
    fn known_friends(&self) -> Option<HashSet<EntityId>>;

    fn set_known_friends(&self, ids: &HashSet<EntityId>) -> StorageResult<()>;

    /// Notifications marked read locally that the service may still report
    /// as unread.
    fn read_notifications(&self) -> HashSet<EntityId>;

    fn mark_notification_read(&self, id: &EntityId) -> StorageResult<()>;

    /// Drops ids the service now agrees are read.
    fn forget_read_notifications(&self, ids: &[EntityId]) -> StorageResult<()>;
}

#[derive(Default)]
struct MemoryState {
    interest: HashMap<EntityId, f64>,
    known_friends: Option<HashSet<EntityId>>,
    read_notifications: HashSet<EntityId>,
}

/// Process-lifetime [`Persistence`], for tests and for sessions run without
/// a data directory.
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<MemoryState>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn interest_level(&self, id: &EntityId) -> Option<f64> {
        self.state.lock().interest.get(id).copied()
    }

    fn interest_levels(&self) -> HashMap<EntityId, f64> {
        self.state.lock().interest.clone()
    }

    fn set_interest_level(&self, id: &EntityId, level: Option<f64>) -> StorageResult<()> {
        let mut state = self.state.lock();
        match level {
            Some(level) => state.interest.insert(id.clone(), level),
            None => state.interest.remove(id),
        };
        Ok(())
    }

    fn known_friends(&self) -> Option<HashSet<EntityId>> {
        self.state.lock().known_friends.clone()
    }

    fn set_known_friends(&self, ids: &HashSet<EntityId>) -> StorageResult<()> {
        self.state.lock().known_friends = Some(ids.clone());
        Ok(())
    }

    fn read_notifications(&self) -> HashSet<EntityId> {
        self.state.lock().read_notifications.clone()
    }

    fn mark_notification_read(&self, id: &EntityId) -> StorageResult<()> {
        self.state.lock().read_notifications.insert(id.clone());
        Ok(())
    }

    fn forget_read_notifications(&self, ids: &[EntityId]) -> StorageResult<()> {
        let mut state = self.state.lock();
        for id in ids {
            state.read_notifications.remove(id);
        }
        Ok(())
    }
}
