//! Error types for the sync layer.

use crate::transport::RemoteError;
use crate::worker::WorkerError;
use socialite_storage::StorageError;
use socialite_store::StoreError;
use socialite_types::EntityId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote service rejected or failed the call.
    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// No session, or the session lost connectivity.
    #[error("session is offline")]
    Offline,

    /// Store contract violation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Settings persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The work could not be queued.
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Another mutation of the same entity has not settled yet.
    #[error("a mutation of {0} is already in flight")]
    MutationInFlight(EntityId),

    /// The work was discarded before it produced a result.
    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Environment failures worth retrying on the next refresh. Everything
    /// else is a caller or contract bug.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Offline | Self::Cancelled)
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        Self::Remote {
            code: err.code,
            message: err.message,
        }
    }
}
