//! Background sync for the Socialite client.
//!
//! Keeps the local object graph in step with the social network:
//!
//! - **Graph**: [`GraphStore`] owns the canonical collections and merges
//!   fetched records into them
//! - **Orchestrator**: [`SyncOrchestrator`] refreshes the graph on three
//!   jittered cadences and abandons a refresh when the session goes offline
//! - **Queues**: [`WorkerQueues`] runs blocking remote calls off the caller's
//!   thread, one FIFO per concern
//! - **Actions**: likes, comments, status updates and photo tags apply
//!   locally first and revert if the service rejects them
//!
//! # Example
//!
//! ```no_run
//! use socialite_sync::mock::MockService;
//! use socialite_sync::{GraphStore, MemoryPersistence, OrchestratorConfig, SyncOrchestrator};
//! use std::sync::Arc;
//!
//! # fn main() -> socialite_sync::SyncResult<()> {
//! let service = Arc::new(MockService::new("me"));
//! let store = GraphStore::new(service, Arc::new(MemoryPersistence::new()), OrchestratorConfig::default())?;
//! store.recover_session("session-key", "secret", "me")?;
//!
//! let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! let handle = SyncOrchestrator::new(store.clone()).start(runtime.handle());
//! handle.refresh();
//! # Ok(())
//! # }
//! ```

mod actions;
mod config;
mod error;
mod events;
mod graph;
mod optimistic;
mod orchestrator;
mod session;
pub mod transport;
pub mod worker;

pub use actions::ActionTicket;
pub use config::{load_config, Cadence, OrchestratorConfig, CONFIG_KEY};
pub use error::{SyncError, SyncResult};
pub use events::{SyncCommand, SyncEvent};
pub use graph::GraphStore;
pub use optimistic::{run_optimistic, OptimisticMutation};
pub use orchestrator::{
    jittered, queue_for, CadenceState, OrchestratorHandle, RefreshOutcome, SyncOrchestrator,
};
pub use session::{Credentials, Session};
pub use transport::{mock, RemoteError, RemoteResult, RemoteService};
pub use worker::{QueueKind, ShutdownMode, WorkerConfig, WorkerError, WorkerQueue, WorkerQueues};

// Settings-backed local state.
pub use socialite_storage::{MemoryPersistence, Persistence, SettingsManager};
