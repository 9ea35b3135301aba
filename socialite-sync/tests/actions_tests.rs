mod common;

use common::{fixture, hold_queue, post, Fixture, ME};
use pretty_assertions::assert_eq;
use socialite_model::{Album, Comment, Photo};
use socialite_sync::mock::{Call, MockService};
use socialite_sync::{
    Cadence, GraphStore, OrchestratorConfig, Persistence, QueueKind, RefreshOutcome, RemoteError,
    SettingsManager, SyncError, SyncEvent, SyncOrchestrator,
};
use socialite_types::EntityId;
use std::sync::Arc;

fn id(s: &str) -> EntityId {
    EntityId::new(s)
}

/// Scripts one story and loads it into the feed.
fn with_story(fx: &Fixture) {
    let mut story = post("p1", "alice", "hello", 10);
    story.like_count = 2;
    fx.service.set_stream(vec![story]);
    fx.store.merge_feed(fx.service.stream()).unwrap();
}

// ── Likes ────────────────────────────────────────────────────────

#[test]
fn add_like_applies_locally_then_confirms() {
    let fx = fixture();
    with_story(&fx);
    let gate = hold_queue(&fx.store, QueueKind::UserInteraction);

    let ticket = fx.store.add_like(&id("p1"));
    {
        let story = fx.store.post(&id("p1")).unwrap();
        let story = story.read();
        assert!(story.has_liked);
        assert_eq!(story.like_count, 3);
    }
    assert_eq!(fx.service.calls(Call::AddLike), 0);

    gate.send(()).unwrap();
    ticket.wait().unwrap();

    assert_eq!(fx.service.calls(Call::AddLike), 1);
    assert!(fx.store.post(&id("p1")).unwrap().read().has_liked);
}

#[test]
fn rejected_like_is_rolled_back() {
    let fx = fixture();
    with_story(&fx);
    let mut events = fx.store.subscribe_events();
    fx.service
        .fail_next(Call::AddLike, RemoteError::new(200, "permissions error"));

    let result = fx.store.add_like(&id("p1")).wait();

    assert!(matches!(result, Err(SyncError::Remote { code: 200, .. })));
    let story = fx.store.post(&id("p1")).unwrap();
    assert!(!story.read().has_liked);
    assert_eq!(story.read().like_count, 2);
    assert!(!story.mutation_in_flight());
    assert!(common::drain(&mut events).iter().any(|e| matches!(
        e,
        SyncEvent::MutationFailed { action, entity, .. } if action == "add_like" && entity == &id("p1")
    )));
}

#[test]
fn rejected_like_keeps_counts_merged_while_in_flight() {
    let fx = fixture();
    with_story(&fx);
    let store = Arc::downgrade(&fx.store);
    fx.service.on_call(Call::AddLike, move || {
        if let Some(store) = store.upgrade() {
            let mut refreshed = post("p1", "alice", "hello", 10);
            refreshed.like_count = 5;
            store.merge_feed(vec![refreshed]).unwrap();
        }
    });
    fx.service
        .fail_next(Call::AddLike, RemoteError::new(200, "permissions error"));

    let result = fx.store.add_like(&id("p1")).wait();

    assert!(result.is_err());
    let story = fx.store.post(&id("p1")).unwrap();
    assert!(!story.read().has_liked);
    assert_eq!(story.read().like_count, 5);
}

#[test]
fn concurrent_mutation_of_the_same_story_is_refused() {
    let fx = fixture();
    with_story(&fx);
    let gate = hold_queue(&fx.store, QueueKind::UserInteraction);

    let first = fx.store.add_like(&id("p1"));
    let second = fx.store.remove_like(&id("p1")).wait();

    assert!(matches!(second, Err(SyncError::MutationInFlight(ref e)) if e == &id("p1")));
    assert_eq!(fx.store.post(&id("p1")).unwrap().read().like_count, 3);

    gate.send(()).unwrap();
    first.wait().unwrap();
    assert_eq!(fx.service.calls(Call::RemoveLike), 0);
}

#[test]
fn actions_need_an_online_session() {
    let fx = fixture();
    with_story(&fx);
    fx.store.session().set_online(false);

    let result = fx.store.add_like(&id("p1")).wait();

    assert!(matches!(result, Err(SyncError::Offline)));
    assert!(!fx.store.post(&id("p1")).unwrap().read().has_liked);
    assert_eq!(fx.service.calls(Call::AddLike), 0);
}

#[test]
fn liking_an_unknown_story_fails_fast() {
    let fx = fixture();
    let result = fx.store.add_like(&id("missing")).wait();
    assert!(matches!(result, Err(SyncError::Store(_))));
}

// ── Comments ─────────────────────────────────────────────────────

#[test]
fn comment_placeholder_takes_the_server_id() {
    let fx = fixture();
    with_story(&fx);
    let gate = hold_queue(&fx.store, QueueKind::UserInteraction);

    let ticket = fx.store.add_comment(&id("p1"), "nice");
    let story = fx.store.post(&id("p1")).unwrap();
    let placeholder = story.read().comments.ids();
    assert_eq!(placeholder.len(), 1);
    assert!(placeholder[0].is_local());
    assert_eq!(story.read().comment_count, 1);

    gate.send(()).unwrap();
    let server_id = ticket.wait().unwrap();

    assert_eq!(server_id, id("comment-1"));
    let story = story.read();
    assert_eq!(story.comments.ids(), vec![id("comment-1")]);
    assert_eq!(story.comment_count, 1);
    let comment = story.comments.find(&server_id).unwrap();
    assert_eq!(comment.read().text, "nice");
    assert_eq!(comment.read().from_id, id(ME));
}

#[test]
fn rejected_comment_disappears() {
    let fx = fixture();
    with_story(&fx);
    fx.service
        .fail_next(Call::AddComment, RemoteError::network("timed out"));

    let result = fx.store.add_comment(&id("p1"), "nice").wait();

    assert!(result.is_err());
    let story = fx.store.post(&id("p1")).unwrap();
    assert!(story.read().comments.is_empty());
    assert_eq!(story.read().comment_count, 0);
}

#[test]
fn rejected_comment_keeps_a_count_merged_while_in_flight() {
    let fx = fixture();
    with_story(&fx);
    let store = Arc::downgrade(&fx.store);
    fx.service.on_call(Call::AddComment, move || {
        if let Some(store) = store.upgrade() {
            let mut refreshed = post("p1", "alice", "hello", 10);
            refreshed.comment_count = 4;
            store.merge_feed(vec![refreshed]).unwrap();
        }
    });
    fx.service
        .fail_next(Call::AddComment, RemoteError::network("timed out"));

    let result = fx.store.add_comment(&id("p1"), "nice").wait();

    assert!(result.is_err());
    let story = fx.store.post(&id("p1")).unwrap();
    assert!(story.read().comments.is_empty());
    assert_eq!(story.read().comment_count, 4);
}

#[test]
fn rejected_comment_removal_restores_the_same_instance() {
    let fx = fixture();
    let story = post("p1", "alice", "hello", 10)
        .with_comments(vec![Comment::new("c1", "p1", "bob", "first", common::minutes_ago(5))])
        .unwrap();
    fx.service.set_stream(vec![story]);
    fx.store.merge_feed(fx.service.stream()).unwrap();
    let entity = fx.store.post(&id("p1")).unwrap();
    let original = entity.read().comments.find(&id("c1")).unwrap();
    fx.service
        .fail_next(Call::RemoveComment, RemoteError::new(10, "not allowed"));

    let result = fx.store.remove_comment(&id("p1"), &id("c1")).wait();

    assert!(result.is_err());
    let restored = entity.read().comments.find(&id("c1")).unwrap();
    assert!(Arc::ptr_eq(&original, &restored));
}

#[test]
fn comment_removal_is_confirmed() {
    let fx = fixture();
    let story = post("p1", "alice", "hello", 10)
        .with_comments(vec![Comment::new("c1", "p1", "bob", "first", common::minutes_ago(5))])
        .unwrap();
    fx.service.set_stream(vec![story]);
    fx.store.merge_feed(fx.service.stream()).unwrap();

    fx.store.remove_comment(&id("p1"), &id("c1")).wait().unwrap();

    assert!(fx.store.post(&id("p1")).unwrap().read().comments.is_empty());
    assert_eq!(fx.service.calls(Call::RemoveComment), 1);
}

// ── Status updates ───────────────────────────────────────────────

#[test]
fn status_placeholder_is_retired_by_server_id() {
    let fx = fixture();
    let orchestrator = SyncOrchestrator::new(fx.store.clone());
    let gate = hold_queue(&fx.store, QueueKind::UserInteraction);

    let ticket = fx.store.update_status("out for lunch");
    let placeholders = fx.store.pending_placeholders();
    assert_eq!(placeholders.len(), 1);
    assert_eq!(fx.store.feed().ids(), placeholders);
    assert_eq!(
        fx.store.me().unwrap().read().status_message.as_deref(),
        Some("out for lunch")
    );

    gate.send(()).unwrap();
    assert_eq!(ticket.wait().unwrap(), Some(id("post-1")));
    // The server story has not been fetched yet.
    assert_eq!(fx.store.feed().ids(), placeholders);

    let outcome = orchestrator.refresh_blocking(Cadence::Dynamic).unwrap();

    assert_eq!(outcome, RefreshOutcome::Completed);
    assert_eq!(fx.store.feed().ids(), vec![id("post-1")]);
    assert!(fx.store.pending_placeholders().is_empty());
}

#[test]
fn status_placeholder_is_retired_by_text_without_an_id() {
    let fx = fixture();
    fx.service.omit_status_ids();
    fx.service.set_stream(vec![post("older", ME, "out for lunch", 60)]);
    let orchestrator = SyncOrchestrator::new(fx.store.clone());

    assert_eq!(fx.store.update_status("out for lunch").wait().unwrap(), None);
    orchestrator.refresh_blocking(Cadence::Dynamic).unwrap();

    // The older story with the same text is not taken for the new one.
    assert_eq!(fx.store.feed().ids(), vec![id("post-1"), id("older")]);
    assert!(fx.store.pending_placeholders().is_empty());
}

#[test]
fn rejected_status_is_withdrawn() {
    let fx = fixture();
    fx.service
        .fail_next(Call::UpdateStatus, RemoteError::new(1, "rate limited"));

    let result = fx.store.update_status("hello").wait();

    assert!(result.is_err());
    assert!(fx.store.feed().is_empty());
    assert!(fx.store.pending_placeholders().is_empty());
    assert_eq!(fx.store.me().unwrap().read().status_message, None);
}

// ── Photos ───────────────────────────────────────────────────────

fn with_album(fx: &Fixture) {
    fx.service.set_albums(
        ME,
        vec![Album::new("a1", ME, "Holiday", common::minutes_ago(60))],
    );
    fx.service.set_photos(
        "a1",
        vec![Photo::new("ph1", "a1", ME, common::minutes_ago(50))],
    );
    let orchestrator = SyncOrchestrator::new(fx.store.clone());
    assert_eq!(
        orchestrator.refresh_blocking(Cadence::Infrequent).unwrap(),
        RefreshOutcome::Completed
    );
}

#[test]
fn photo_tag_is_kept_when_accepted() {
    let fx = fixture();
    with_album(&fx);

    fx.store
        .tag_photo(&id("ph1"), Some(id("bob")), "Bob", 0.25, 0.75)
        .wait()
        .unwrap();

    let photo = fx.store.photo(&id("ph1")).unwrap();
    assert_eq!(photo.read().tags.ids(), vec![id("ph1:bob")]);
    assert_eq!(fx.service.calls(Call::AddPhotoTag), 1);
}

#[test]
fn rejected_photo_tag_is_removed() {
    let fx = fixture();
    with_album(&fx);
    fx.service
        .fail_next(Call::AddPhotoTag, RemoteError::new(321, "tagging disabled"));

    let result = fx.store.tag_photo(&id("ph1"), None, "sunset", 0.5, 0.5).wait();

    assert!(result.is_err());
    assert!(fx.store.photo(&id("ph1")).unwrap().read().tags.is_empty());
}

#[test]
fn rejected_retag_moves_the_tag_back() {
    let fx = fixture();
    with_album(&fx);
    fx.store
        .tag_photo(&id("ph1"), Some(id("bob")), "Bob", 0.1, 0.1)
        .wait()
        .unwrap();
    fx.service
        .fail_next(Call::AddPhotoTag, RemoteError::new(321, "tagging disabled"));

    let result = fx
        .store
        .tag_photo(&id("ph1"), Some(id("bob")), "Bob", 0.9, 0.9)
        .wait();

    assert!(result.is_err());
    let photo = fx.store.photo(&id("ph1")).unwrap();
    let tag = photo.read().tags.find(&id("ph1:bob")).unwrap();
    assert_eq!((tag.read().x, tag.read().y), (0.1, 0.1));
    assert_eq!(photo.read().tags.len(), 1);
}

#[test]
fn uploaded_photo_joins_its_album() {
    let fx = fixture();
    with_album(&fx);

    let photo = fx
        .store
        .upload_photo(Some(id("a1")), "/tmp/beach.jpg", "beach")
        .wait()
        .unwrap();

    assert_eq!(photo.read().caption, "beach");
    let album = fx.store.album(&id("a1")).unwrap();
    assert!(album.read().photos.contains(photo.id()));
    assert!(Arc::ptr_eq(&fx.store.photo(photo.id()).unwrap(), &photo));
}

// ── Local-only state ─────────────────────────────────────────────

#[test]
fn reading_a_notification_is_remembered() {
    let fx = fixture();
    fx.store
        .merge_notifications(vec![common::notification("n1", "Bob poked you", true)])
        .unwrap();

    fx.store.mark_notification_read(&id("n1")).unwrap();

    assert!(!fx.store.notifications().find(&id("n1")).unwrap().read().is_unread);
    assert!(fx.persistence.read_notifications().contains(&id("n1")));
}

#[test]
fn interest_level_reorders_friends() {
    let fx = fixture();
    fx.store
        .merge_friends(vec![common::friend("f1", "Ann"), common::friend("f2", "Ben")])
        .unwrap();

    fx.store.set_interest_level(&id("f2"), Some(0.8)).unwrap();

    assert_eq!(fx.store.friends().ids()[0], id("f2"));
    assert_eq!(fx.persistence.interest_level(&id("f2")), Some(0.8));
    assert_eq!(
        fx.store.contact(&id("f2")).unwrap().read().interest_level,
        Some(0.8)
    );
}

#[test]
fn interest_level_that_cannot_be_saved_is_withdrawn() {
    let service = Arc::new(MockService::new(ME));
    let store = GraphStore::new(
        service,
        Arc::new(SettingsManager::in_memory()),
        OrchestratorConfig::default(),
    )
    .unwrap();
    store.recover_session("session-key", "secret", ME).unwrap();
    store
        .merge_friends(vec![common::friend("f1", "Ann"), common::friend("f2", "Ben")])
        .unwrap();
    store.set_interest_level(&id("f2"), Some(0.8)).unwrap();

    let result = store.set_interest_level(&id("f2"), Some(f64::NAN));

    assert!(matches!(result, Err(SyncError::Storage(_))));
    assert_eq!(store.contact(&id("f2")).unwrap().read().interest_level, Some(0.8));
    assert_eq!(store.friends().ids(), vec![id("f2"), id("f1")]);
    assert_eq!(store.persistence().interest_level(&id("f2")), Some(0.8));
}
