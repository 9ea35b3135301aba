//! Identifier type used as the key of every domain entity.
//!
//! Ids are server-assigned strings. They are interned so that the many
//! copies held by foreign keys (post actors, comment authors, photo owners)
//! share one allocation, and so that equality usually resolves on a pointer
//! comparison. Locally minted ids are not interned.

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::Error;

/// Prefix of ids minted locally rather than assigned by the server.
const LOCAL_PREFIX: &str = "local:";

fn interner() -> &'static Mutex<HashSet<Arc<str>>> {
    static POOL: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(HashSet::new()))
}

fn empty() -> Arc<str> {
    static EMPTY: OnceLock<Arc<str>> = OnceLock::new();
    EMPTY.get_or_init(|| Arc::from("")).clone()
}

/// Server ids are pooled for the life of the process. Local ids are minted
/// afresh for every keyless record, so they are left out of the pool.
fn intern(s: &str) -> Arc<str> {
    if s.is_empty() {
        return empty();
    }
    if s.starts_with(LOCAL_PREFIX) {
        return Arc::from(s);
    }
    let mut pool = interner().lock();
    if let Some(existing) = pool.get(s) {
        return existing.clone();
    }
    let value: Arc<str> = Arc::from(s);
    pool.insert(value.clone());
    value
}

/// Unique identifier for an entity.
///
/// Two ids are equal iff their underlying strings are equal. The default id
/// is empty and *invalid*: it is never a legal key and the store rejects it.
#[derive(Clone)]
pub struct EntityId(Arc<str>);

impl EntityId {
    /// Creates an id from a server-assigned string. An empty string yields
    /// the invalid id.
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(intern(s.as_ref()))
    }

    /// Parses an id, rejecting the empty string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::InvalidId(s.to_string()));
        }
        Ok(Self::new(s))
    }

    /// Mints a locally unique id for records that have no server key yet.
    #[must_use]
    pub fn synthesize() -> Self {
        Self::new(format!("{LOCAL_PREFIX}{}", Uuid::now_v7()))
    }

    /// The invalid id.
    #[must_use]
    pub fn invalid() -> Self {
        Self(empty())
    }

    /// Returns false for the default/empty id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    /// Returns true if this id was minted by [`EntityId::synthesize`].
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }

    /// Returns the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if both ids share the same interned allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::invalid()
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityId").field(&&*self.0).finish()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}
