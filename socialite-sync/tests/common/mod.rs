//! Fixtures shared by the sync tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use socialite_model::{Contact, Notification, Post};
use socialite_sync::mock::MockService;
use socialite_sync::{GraphStore, MemoryPersistence, OrchestratorConfig, QueueKind, SyncEvent};
use std::sync::Arc;
use std::sync::mpsc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

pub const ME: &str = "me";

/// Routes `tracing` output through the test harness. `RUST_LOG` filters.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub service: Arc<MockService>,
    pub persistence: Arc<MemoryPersistence>,
    pub store: Arc<GraphStore>,
}

/// A graph with an online session for [`ME`].
pub fn fixture() -> Fixture {
    fixture_with(OrchestratorConfig::default())
}

pub fn fixture_with(config: OrchestratorConfig) -> Fixture {
    init_tracing();
    let service = Arc::new(MockService::new(ME));
    let persistence = Arc::new(MemoryPersistence::new());
    let store = GraphStore::new(service.clone(), persistence.clone(), config).unwrap();
    store.recover_session("session-key", "secret", ME).unwrap();
    Fixture {
        service,
        persistence,
        store,
    }
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

pub fn post(id: &str, actor: &str, message: &str, minutes: i64) -> Post {
    Post::new(id, actor, message, minutes_ago(minutes))
}

pub fn friend(id: &str, name: &str) -> Contact {
    Contact::new(id, name)
}

pub fn notification(id: &str, title: &str, unread: bool) -> Notification {
    let mut n = Notification::new(id, "sender", title, minutes_ago(5));
    n.is_unread = unread;
    n
}

/// Parks `kind` behind a job that waits for the returned sender to fire
/// (or be dropped). Work queued afterwards stays queued until then.
pub fn hold_queue(store: &GraphStore, kind: QueueKind) -> mpsc::Sender<()> {
    let (tx, rx) = mpsc::channel::<()>();
    store
        .queues()
        .queue_request(kind, "hold", move || {
            let _ = rx.recv_timeout(std::time::Duration::from_secs(5));
            Ok(())
        })
        .unwrap();
    tx
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
