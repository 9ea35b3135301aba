//! Persisted client state for Socialite.
//!
//! # Architecture
//!
//! - [`SettingsManager`] is a JSON key-value file under the application data
//!   directory. It is constructed once and injected wherever settings are
//!   needed.
//! - [`Persistence`] is the narrow view the sync engine uses: interest
//!   levels, the set of friends already seen, and notifications the user
//!   marked read locally. `SettingsManager` implements it on disk and
//!   [`MemoryPersistence`] in memory.

mod error;
mod persistence;
mod settings;

pub use error::{StorageError, StorageResult};
pub use persistence::{MemoryPersistence, Persistence};
pub use settings::SettingsManager;
