mod common;

use common::{fixture, friend, post, ME};
use pretty_assertions::assert_eq;
use socialite_sync::{
    load_config, GraphStore, MemoryPersistence, OrchestratorConfig, SettingsManager, SyncError,
    SyncEvent, CONFIG_KEY,
};
use socialite_sync::mock::MockService;
use socialite_types::EntityId;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ── Session lifecycle ────────────────────────────────────────────

#[test]
fn recovered_session_materializes_the_user() {
    let fx = fixture();
    let session = fx.store.session();

    assert!(session.is_online());
    assert_eq!(session.user_id(), Some(EntityId::new(ME)));
    assert_eq!(session.generation(), 1);
    assert_eq!(fx.store.me().unwrap().id(), &EntityId::new(ME));
}

#[test]
fn credentials_debug_hides_secrets() {
    let fx = fixture();
    let credentials = fx.store.session().credentials().unwrap();
    let rendered = format!("{credentials:?}");
    assert!(rendered.contains("me"));
    assert!(!rendered.contains("secret"));
    assert!(!rendered.contains("session-key"));
}

#[test]
fn disconnect_clears_the_graph() {
    let fx = fixture();
    fx.store.merge_friends(vec![friend("f1", "Ann")]).unwrap();
    fx.store
        .merge_feed(vec![post("p1", "f1", "hello", 3)])
        .unwrap();
    let mut events = fx.store.subscribe_events();

    assert!(fx.store.disconnect_session());

    assert!(!fx.store.session().is_online());
    assert!(fx.store.me().is_none());
    assert!(fx.store.friends().is_empty());
    assert!(fx.store.feed().is_empty());
    assert!(fx.store.contacts().is_empty());
    assert_eq!(common::drain(&mut events), vec![SyncEvent::SessionEnded]);
    assert!(!fx.store.disconnect_session());
}

#[test]
fn connectivity_needs_a_session() {
    let fx = fixture();
    fx.store.disconnect_session();

    fx.store.session().set_online(true);

    assert!(!fx.store.session().is_online());
    assert!(matches!(fx.store.session().require_online(), Err(SyncError::Offline)));
}

#[test]
fn recovering_replaces_the_active_session() {
    let fx = fixture();
    fx.store.merge_feed(vec![post("p1", "f1", "hello", 3)]).unwrap();

    fx.store.recover_session("key-2", "secret-2", "someone-else").unwrap();

    assert!(fx.store.feed().is_empty());
    assert_eq!(fx.store.session().generation(), 2);
    assert_eq!(
        fx.store.me().unwrap().id(),
        &EntityId::new("someone-else")
    );
}

#[test]
fn merges_of_an_ended_session_are_dropped() {
    let fx = fixture();
    let generation = fx.store.session().generation();
    fx.store.disconnect_session();
    fx.store.recover_session("key-2", "secret-2", ME).unwrap();

    let merged = fx
        .store
        .ingest(generation, |store| store.merge_feed(vec![post("p1", "f1", "stale", 3)]))
        .unwrap();

    assert!(merged.is_none());
    assert!(fx.store.feed().is_empty());
}

#[test]
fn disconnect_waits_for_a_running_merge() {
    let fx = fixture();
    let generation = fx.store.session().generation();
    let (started_tx, started_rx) = mpsc::channel();
    let store = fx.store.clone();

    let merge = thread::spawn(move || {
        store.ingest(generation, |store| {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            store.merge_feed(vec![post("p1", "f1", "hello", 3)])
        })
    });
    started_rx.recv().unwrap();
    assert!(fx.store.disconnect_session());

    let merged = merge.join().unwrap().unwrap();
    assert_eq!(merged.map(|report| report.added), Some(1));
    // The merge landed before the graph was cleared, not after.
    assert!(fx.store.feed().is_empty());
}

#[test]
fn session_without_user_is_rejected() {
    let store = GraphStore::new(
        Arc::new(MockService::new(ME)),
        Arc::new(MemoryPersistence::new()),
        OrchestratorConfig::default(),
    )
    .unwrap();

    let result = store.recover_session("key", "secret", EntityId::invalid());

    assert!(result.is_err());
    assert!(store.session().user_id().is_none());
}

#[test]
fn profile_of_another_user_is_rejected() {
    let fx = fixture();
    let result = fx.store.merge_me(friend("f1", "Ann"));
    assert!(matches!(result, Err(SyncError::Store(_))));
}

// ── Configuration ────────────────────────────────────────────────

#[test]
fn missing_config_takes_defaults() {
    let settings = SettingsManager::in_memory();
    assert_eq!(load_config(&settings).unwrap(), OrchestratorConfig::default());
}

#[test]
fn config_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = OrchestratorConfig {
        dynamic_interval_secs: 60,
        feed_count: 50,
        jitter_fraction: 0.0,
        ..OrchestratorConfig::default()
    };
    {
        let settings = SettingsManager::open(dir.path()).unwrap();
        config.save(&settings).unwrap();
    }

    let settings = SettingsManager::open(dir.path()).unwrap();
    assert_eq!(load_config(&settings).unwrap(), config);
}

#[test]
fn partial_config_fills_in_defaults() {
    let settings = SettingsManager::in_memory();
    settings
        .set(CONFIG_KEY, &serde_json::json!({ "feed_count": 10 }))
        .unwrap();

    let config = load_config(&settings).unwrap();

    assert_eq!(config.feed_count, 10);
    assert_eq!(config.quick_feed_count, 20);
    assert_eq!(
        config.interval(socialite_sync::Cadence::Moderate).as_secs(),
        15 * 60
    );
}

#[test]
fn malformed_config_is_an_error() {
    let settings = SettingsManager::in_memory();
    settings
        .set(CONFIG_KEY, &serde_json::json!({ "feed_count": "many" }))
        .unwrap();

    assert!(matches!(load_config(&settings), Err(SyncError::Storage(_))));
}
