use crate::config::Cadence;
use socialite_types::EntityId;

/// Commands accepted by a running orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Refresh every cadence now.
    RefreshAll,
    /// Refresh one cadence now.
    Refresh(Cadence),
    /// Stop the timer loop.
    Shutdown,
}

/// Observable sync activity.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SessionStarted { user_id: EntityId },
    SessionEnded,
    RefreshStarted { cadence: Cadence },
    RefreshCompleted { cadence: Cadence },
    RefreshFailed { cadence: Cadence, error: String },
    /// The session went offline mid-refresh; merges already applied stay.
    RefreshAbandoned { cadence: Cadence },
    /// Friends not seen by any earlier refresh.
    NewFriends(Vec<EntityId>),
    /// The service rejected a user action; its local effect was reverted.
    MutationFailed {
        action: String,
        entity: EntityId,
        error: String,
    },
}
