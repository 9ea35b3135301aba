//! Core type definitions for Socialite.
//!
//! This crate defines the fundamental types shared by every layer of the
//! sync engine:
//! - [`EntityId`], the interned key carried by every synchronizable entity
//!
//! Domain entities (contacts, posts, photos, ...) live in `socialite-model`;
//! the merge machinery lives in `socialite-store`.

mod ids;

pub use ids::EntityId;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid entity id: {0:?}")]
    InvalidId(String),
}
