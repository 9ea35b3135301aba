//! Collection change events.

use socialite_types::EntityId;

/// A structural or forwarded change observed on a [`MergeableCollection`].
///
/// `F` is the entity's field enum, so observers can match exhaustively on
/// deep field edits.
///
/// [`MergeableCollection`]: crate::MergeableCollection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent<F> {
    /// An entity was inserted at `index`.
    Added { id: EntityId, index: usize },
    /// An entity left the collection.
    Removed { id: EntityId },
    /// A merge changed an entity's sort position.
    Moved { id: EntityId, from: usize, to: usize },
    /// The whole collection was re-sorted.
    Reordered,
    /// The collection was emptied.
    Cleared,
    /// A member's field changed.
    ItemChanged { id: EntityId, field: F },
}

impl<F> CollectionEvent<F> {
    /// The entity this event concerns, if any.
    pub fn id(&self) -> Option<&EntityId> {
        match self {
            Self::Added { id, .. }
            | Self::Removed { id }
            | Self::Moved { id, .. }
            | Self::ItemChanged { id, .. } => Some(id),
            Self::Reordered | Self::Cleared => None,
        }
    }

    /// Returns true for add/remove/move/reorder/clear.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::ItemChanged { .. })
    }
}
