//! JSON-file settings store.

use crate::error::{StorageError, StorageResult};
use crate::persistence::Persistence;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use socialite_types::EntityId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FILE_NAME: &str = "settings.json";

const INTEREST_LEVELS: &str = "interest_levels";
const KNOWN_FRIENDS: &str = "known_friends";
const READ_NOTIFICATIONS: &str = "read_notifications";

/// Key-value settings persisted as one JSON object.
///
/// Every write is saved immediately. Writes hold the lock across the save,
/// so saves from different threads never interleave on disk.
pub struct SettingsManager {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl SettingsManager {
    /// Opens (or creates) the settings file inside `dir`.
    ///
    /// A file that does not parse is moved aside to `settings.json.bak`
    /// and the store starts empty.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(FILE_NAME);

        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(values) => values,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "settings file unreadable, starting fresh");
                    fs::rename(&path, path.with_extension("json.bak"))?;
                    Map::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(err.into()),
        };

        debug!(path = %path.display(), keys = values.len(), "settings opened");
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reads and decodes a value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let value = self.values.lock().get(key).cloned();
        value
            .map(|v| serde_json::from_value(v).map_err(StorageError::from))
            .transpose()
    }

    /// Reads a value, falling back to `T::default()` when absent.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> StorageResult<T> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Stores a value and saves.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value)?;
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        self.save_locked(&values)
    }

    /// Removes a value and saves. Returns whether it existed.
    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut values = self.values.lock();
        if values.remove(key).is_none() {
            return Ok(false);
        }
        self.save_locked(&values)?;
        Ok(true)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.lock().keys().cloned().collect()
    }

    /// Read-modify-write of one value under the store lock.
    pub fn update<T, F>(&self, key: &str, f: F) -> StorageResult<()>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T),
    {
        let mut values = self.values.lock();
        let mut current: T = match values.get(key) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => T::default(),
        };
        f(&mut current);
        values.insert(key.to_string(), serde_json::to_value(&current)?);
        self.save_locked(&values)
    }

    fn save_locked(&self, values: &Map<String, Value>) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_logged<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get_or_default(key).unwrap_or_else(|err| {
            warn!(key, error = %err, "ignoring malformed setting");
            T::default()
        })
    }
}

impl Persistence for SettingsManager {
    fn interest_level(&self, id: &EntityId) -> Option<f64> {
        self.read_logged::<BTreeMap<EntityId, f64>>(INTEREST_LEVELS)
            .get(id)
            .copied()
    }

    fn interest_levels(&self) -> HashMap<EntityId, f64> {
        self.read_logged::<BTreeMap<EntityId, f64>>(INTEREST_LEVELS)
            .into_iter()
            .collect()
    }

    fn set_interest_level(&self, id: &EntityId, level: Option<f64>) -> StorageResult<()> {
        if level.is_some_and(|l| !l.is_finite()) {
            return Err(StorageError::InvalidData(format!(
                "interest level for {id} is not a finite number"
            )));
        }
        self.update(INTEREST_LEVELS, |levels: &mut BTreeMap<EntityId, f64>| {
            match level {
                Some(level) => levels.insert(id.clone(), level),
                None => levels.remove(id),
            };
        })
    }

    fn known_friends(&self) -> Option<HashSet<EntityId>> {
        if !self.contains(KNOWN_FRIENDS) {
            return None;
        }
        Some(
            self.read_logged::<Vec<EntityId>>(KNOWN_FRIENDS)
                .into_iter()
                .collect(),
        )
    }

    fn set_known_friends(&self, ids: &HashSet<EntityId>) -> StorageResult<()> {
        let mut sorted: Vec<&EntityId> = ids.iter().collect();
        sorted.sort();
        self.set(KNOWN_FRIENDS, &sorted)
    }

    fn read_notifications(&self) -> HashSet<EntityId> {
        self.read_logged::<Vec<EntityId>>(READ_NOTIFICATIONS)
            .into_iter()
            .collect()
    }

    fn mark_notification_read(&self, id: &EntityId) -> StorageResult<()> {
        self.update(READ_NOTIFICATIONS, |ids: &mut Vec<EntityId>| {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        })
    }

    fn forget_read_notifications(&self, ids: &[EntityId]) -> StorageResult<()> {
        self.update(READ_NOTIFICATIONS, |stored: &mut Vec<EntityId>| {
            stored.retain(|id| !ids.contains(id));
        })
    }
}
