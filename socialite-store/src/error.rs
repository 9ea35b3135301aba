//! Error types for the store.

use socialite_types::EntityId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Contract violations detected by the store.
///
/// None of these are transient: they indicate a caller bug and must not be
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An item carried the invalid (empty) key.
    #[error("invalid entity key at batch position {position}")]
    InvalidKey { position: usize },

    /// Two revisions with different primary keys were merged.
    #[error("key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: EntityId, found: EntityId },

    /// Entity not present.
    #[error("entity not found: {0}")]
    NotFound(EntityId),
}
