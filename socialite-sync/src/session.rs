//! Session lifecycle and connectivity.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use socialite_types::EntityId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Credentials of an authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub session_key: String,
    pub secret: String,
    pub user_id: EntityId,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// The authenticated session, shared by every queue.
///
/// `is_online` is read after each blocking call, so a connectivity change
/// takes effect at the next check rather than interrupting a call.
#[derive(Debug, Default)]
pub struct Session {
    credentials: RwLock<Option<Credentials>>,
    online: AtomicBool,
    generation: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session. Returns the new session generation.
    pub fn recover(&self, credentials: Credentials) -> u64 {
        let user_id = credentials.user_id.clone();
        *self.credentials.write() = Some(credentials);
        self.online.store(true, Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(user = %user_id, generation, "session started");
        generation
    }

    /// Ends the session. Returns false if none was active.
    pub fn disconnect(&self) -> bool {
        self.online.store(false, Ordering::Release);
        let ended = self.credentials.write().take();
        if let Some(credentials) = &ended {
            info!(user = %credentials.user_id, "session ended");
        }
        ended.is_some()
    }

    /// Marks connectivity lost or regained without ending the session.
    pub fn set_online(&self, online: bool) {
        let online = online && self.credentials.read().is_some();
        if self.online.swap(online, Ordering::AcqRel) != online {
            info!(online, "connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn user_id(&self) -> Option<EntityId> {
        self.credentials.read().as_ref().map(|c| c.user_id.clone())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }

    /// Increments on every [`recover`](Self::recover).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The session user, or [`SyncError::Offline`].
    pub fn require_online(&self) -> SyncResult<EntityId> {
        match self.user_id() {
            Some(user_id) if self.is_online() => Ok(user_id),
            _ => Err(SyncError::Offline),
        }
    }
}
