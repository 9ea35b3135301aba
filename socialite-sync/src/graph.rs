//! The client object graph and its collaborators.
//!
//! [`GraphStore`] owns the canonical collections (friends, news feed,
//! filters, notifications, albums), the contact and album directories that
//! keep one instance per key, the session, the request queues and the
//! remote service. Refreshes and user actions both go through it.

use crate::config::OrchestratorConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::session::{Credentials, Session};
use crate::transport::RemoteService;
use crate::worker::{ShutdownMode, WorkerConfig, WorkerQueues};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use socialite_model::{ActivityFilter, Album, AlbumField, Contact, Notification, Photo, Post};
use socialite_storage::Persistence;
use socialite_store::{
    repair_keys, EntityDirectory, MergeOptions, MergeReport, Mergeable, MergeableCollection,
    Shared, StoreError,
};
use socialite_types::EntityId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A locally created status story awaiting its server counterpart.
struct Placeholder {
    local_id: EntityId,
    actor_id: EntityId,
    text: String,
    created: DateTime<Utc>,
    state: PlaceholderState,
}

enum PlaceholderState {
    /// The remote call has not returned.
    Pending,
    /// The service accepted the status, reporting the story id if it could.
    Confirmed(Option<EntityId>),
}

pub struct GraphStore {
    service: Arc<dyn RemoteService>,
    persistence: Arc<dyn Persistence>,
    session: Arc<Session>,
    queues: WorkerQueues,
    events: broadcast::Sender<SyncEvent>,
    config: OrchestratorConfig,

    contacts: Arc<EntityDirectory<Contact>>,
    album_directory: Arc<EntityDirectory<Album>>,
    me: RwLock<Option<Shared<Contact>>>,
    friends: MergeableCollection<Contact>,
    feed: MergeableCollection<Post>,
    filters: MergeableCollection<ActivityFilter>,
    notifications: MergeableCollection<Notification>,
    albums: MergeableCollection<Album>,
    placeholders: Mutex<Vec<Placeholder>>,
    /// Held for reading by merges, for writing by session changes.
    session_gate: RwLock<()>,
}

impl GraphStore {
    pub fn new(
        service: Arc<dyn RemoteService>,
        persistence: Arc<dyn Persistence>,
        config: OrchestratorConfig,
    ) -> SyncResult<Arc<Self>> {
        Self::with_workers(service, persistence, config, &WorkerConfig::default())
    }

    pub fn with_workers(
        service: Arc<dyn RemoteService>,
        persistence: Arc<dyn Persistence>,
        config: OrchestratorConfig,
        workers: &WorkerConfig,
    ) -> SyncResult<Arc<Self>> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let contacts = Arc::new(EntityDirectory::new());
        let album_directory = Arc::new(EntityDirectory::new());

        let friends = MergeableCollection::with_directory(contacts.clone());
        friends.set_comparison(Contact::by_interest);
        let albums = MergeableCollection::with_directory(album_directory.clone());
        albums.set_comparison(Album::recently_modified);

        Ok(Arc::new(Self {
            service,
            persistence,
            session: Arc::new(Session::new()),
            queues: WorkerQueues::new(workers)?,
            events,
            config,
            contacts,
            album_directory,
            me: RwLock::new(None),
            friends,
            feed: MergeableCollection::with_comparison(Post::newest_first),
            filters: MergeableCollection::with_comparison(ActivityFilter::by_rank),
            notifications: MergeableCollection::with_comparison(Notification::newest_first),
            albums,
            placeholders: Mutex::new(Vec::new()),
            session_gate: RwLock::new(()),
        }))
    }

    // ── Session ──────────────────────────────────────────────────

    /// Starts a session for `user_id`. An active session is ended first.
    pub fn recover_session(
        &self,
        session_key: impl Into<String>,
        secret: impl Into<String>,
        user_id: impl Into<EntityId>,
    ) -> SyncResult<()> {
        let user_id = user_id.into();
        if !user_id.is_valid() {
            error!("session recovery without a user id");
            return Err(SyncError::Store(StoreError::InvalidKey { position: 0 }));
        }
        let _gate = self.session_gate.write();
        if self.session.user_id().is_some() {
            self.end_session();
        }
        let me = self
            .contacts
            .get_or_create(&user_id, || Contact::new(user_id.clone(), ""))?;
        *self.me.write() = Some(me);
        self.session.recover(Credentials {
            session_key: session_key.into(),
            secret: secret.into(),
            user_id: user_id.clone(),
        });
        self.emit(SyncEvent::SessionStarted { user_id });
        Ok(())
    }

    /// Ends the session and drops every collection. Returns false if no
    /// session was active.
    ///
    /// Waits for a merge already running under [`ingest`](Self::ingest), so
    /// no merge of the ended session lands after the graph is cleared.
    pub fn disconnect_session(&self) -> bool {
        let _gate = self.session_gate.write();
        self.end_session()
    }

    fn end_session(&self) -> bool {
        let ended = self.session.disconnect();
        self.clear();
        if ended {
            self.emit(SyncEvent::SessionEnded);
        }
        ended
    }

    fn clear(&self) {
        self.placeholders.lock().clear();
        self.feed.clear();
        self.friends.clear();
        self.filters.clear();
        self.notifications.clear();
        self.albums.clear();
        self.album_directory.clear();
        self.contacts.clear();
        *self.me.write() = None;
        debug!("object graph cleared");
    }

    /// Runs `merge` while session `generation` is online. Returns `None`,
    /// without running it, once that session went offline or was replaced.
    pub fn ingest<R>(
        &self,
        generation: u64,
        merge: impl FnOnce(&Self) -> SyncResult<R>,
    ) -> SyncResult<Option<R>> {
        let _gate = self.session_gate.read();
        if !self.session.is_online() || self.session.generation() != generation {
            return Ok(None);
        }
        merge(self).map(Some)
    }

    /// Drains (or cancels) every request queue and joins its threads.
    pub fn shutdown(&self, mode: ShutdownMode) {
        self.queues.shutdown(mode);
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn service(&self) -> &Arc<dyn RemoteService> {
        &self.service
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn queues(&self) -> &WorkerQueues {
        &self.queues
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// The session user's own contact.
    pub fn me(&self) -> Option<Shared<Contact>> {
        self.me.read().clone()
    }

    /// Any contact materialized by this session.
    pub fn contact(&self, id: &EntityId) -> Option<Shared<Contact>> {
        self.contacts.get(id)
    }

    pub fn contacts(&self) -> &Arc<EntityDirectory<Contact>> {
        &self.contacts
    }

    /// Friends, most interesting first.
    pub fn friends(&self) -> &MergeableCollection<Contact> {
        &self.friends
    }

    /// News feed, newest first.
    pub fn feed(&self) -> &MergeableCollection<Post> {
        &self.feed
    }

    pub fn filters(&self) -> &MergeableCollection<ActivityFilter> {
        &self.filters
    }

    pub fn notifications(&self) -> &MergeableCollection<Notification> {
        &self.notifications
    }

    /// Albums of the user and of refreshed friends, most recently modified first.
    pub fn albums(&self) -> &MergeableCollection<Album> {
        &self.albums
    }

    pub fn albums_of(&self, owner_id: &EntityId) -> Vec<Shared<Album>> {
        self.albums
            .snapshot()
            .into_iter()
            .filter(|album| &album.read().owner_id == owner_id)
            .collect()
    }

    pub fn album(&self, id: &EntityId) -> Option<Shared<Album>> {
        self.album_directory.get(id)
    }

    pub fn post(&self, id: &EntityId) -> Option<Shared<Post>> {
        self.feed.find(id)
    }

    /// Looks a photo up across every loaded album.
    pub fn photo(&self, id: &EntityId) -> Option<Shared<Photo>> {
        self.albums
            .snapshot()
            .iter()
            .find_map(|album| album.read().photos.find(id))
    }

    pub(crate) fn require_post(&self, id: &EntityId) -> SyncResult<Shared<Post>> {
        self.post(id)
            .ok_or_else(|| SyncError::Store(StoreError::NotFound(id.clone())))
    }

    // ── Ingestion ────────────────────────────────────────────────

    /// Merges the session user's own profile.
    pub fn merge_me(&self, mut contact: Contact) -> SyncResult<Shared<Contact>> {
        let user_id = self.session.user_id().ok_or(SyncError::Offline)?;
        if !contact.id.is_valid() {
            contact.repair_key(user_id);
        } else if contact.id != user_id {
            error!(expected = %user_id, found = %contact.id, "profile of another user");
            return Err(SyncError::Store(StoreError::KeyMismatch {
                expected: user_id,
                found: contact.id,
            }));
        }
        let me = self.contacts.register(contact)?;
        *self.me.write() = Some(me.clone());
        Ok(me)
    }

    /// Replaces the friend list, enriching each friend with its persisted
    /// interest level and reporting friends never seen before.
    pub fn merge_friends(&self, mut friends: Vec<Contact>) -> SyncResult<MergeReport> {
        repair_keys(&mut friends);
        let levels = self.persistence.interest_levels();
        for friend in &mut friends {
            friend.interest_level = levels.get(&friend.id).copied();
        }
        let report = self
            .friends
            .merge(friends, MergeOptions::new().reset_missing())?;
        self.record_known_friends()?;
        debug!(added = report.added, updated = report.updated, removed = report.removed, "friends merged");
        Ok(report)
    }

    fn record_known_friends(&self) -> SyncResult<()> {
        let current: HashSet<EntityId> = self
            .friends
            .ids()
            .into_iter()
            .filter(|id| !id.is_local())
            .collect();
        match self.persistence.known_friends() {
            Some(known) if known == current => return Ok(()),
            Some(known) => {
                let mut fresh: Vec<EntityId> = current.difference(&known).cloned().collect();
                if !fresh.is_empty() {
                    fresh.sort();
                    info!(count = fresh.len(), "new friends");
                    self.emit(SyncEvent::NewFriends(fresh));
                }
            }
            None => debug!(count = current.len(), "recording initial friend list"),
        }
        self.persistence.set_known_friends(&current)?;
        Ok(())
    }

    /// Merges a page of the news feed and retires status placeholders whose
    /// server story has arrived.
    pub fn merge_feed(&self, mut posts: Vec<Post>) -> SyncResult<MergeReport> {
        repair_keys(&mut posts);
        let report = self.feed.merge(
            posts,
            MergeOptions::new().max_count(self.config.max_feed_items),
        )?;
        self.reconcile_placeholders();
        debug!(added = report.added, updated = report.updated, trimmed = report.trimmed, "feed merged");
        Ok(report)
    }

    pub fn merge_filters(&self, mut filters: Vec<ActivityFilter>) -> SyncResult<MergeReport> {
        repair_keys(&mut filters);
        Ok(self
            .filters
            .merge(filters, MergeOptions::new().reset_missing())?)
    }

    /// Replaces the notification list with `items`, the service's full
    /// listing. An empty listing empties the list.
    ///
    /// Notifications the user read locally stay read while the service
    /// still lists them unread; the local mark is dropped once it does not.
    pub fn merge_notifications(&self, mut items: Vec<Notification>) -> SyncResult<MergeReport> {
        repair_keys(&mut items);
        let read_locally = self.persistence.read_notifications();
        let mut still_unread = HashSet::new();
        for item in &mut items {
            if item.is_unread && read_locally.contains(&item.id) {
                item.is_unread = false;
                still_unread.insert(item.id.clone());
            }
        }
        let agreed: Vec<EntityId> = read_locally
            .into_iter()
            .filter(|id| !still_unread.contains(id))
            .collect();
        if !agreed.is_empty() {
            debug!(count = agreed.len(), "service caught up with local reads");
            self.persistence.forget_read_notifications(&agreed)?;
        }

        let listed: HashSet<EntityId> = items.iter().map(|n| n.id.clone()).collect();
        let mut report = self
            .notifications
            .merge(items, MergeOptions::new().reset_missing())?;
        // An empty batch is a no-op for the collection.
        for id in self.notifications.ids() {
            if !listed.contains(&id) && self.notifications.remove(&id).is_some() {
                report.removed += 1;
            }
        }
        Ok(report)
    }

    /// Merges the album list of one owner. That owner's albums missing from
    /// `albums` are dropped; other owners' albums are left alone.
    pub fn merge_albums(&self, owner_id: &EntityId, mut albums: Vec<Album>) -> SyncResult<MergeReport> {
        repair_keys(&mut albums);
        for album in &mut albums {
            if !album.owner_id.is_valid() {
                album.owner_id = owner_id.clone();
            }
        }
        let listed: HashSet<EntityId> = albums.iter().map(|a| a.id.clone()).collect();
        let mut report = self.albums.merge(albums, MergeOptions::new())?;
        for album in self.albums_of(owner_id) {
            if !listed.contains(album.id()) && self.albums.remove(album.id()).is_some() {
                report.removed += 1;
            }
        }
        Ok(report)
    }

    /// Merges photos into an album already in the graph.
    pub fn merge_photos(&self, album_id: &EntityId, mut photos: Vec<Photo>) -> SyncResult<MergeReport> {
        let album = self
            .album(album_id)
            .ok_or_else(|| SyncError::Store(StoreError::NotFound(album_id.clone())))?;
        repair_keys(&mut photos);
        for photo in &mut photos {
            photo.album_id = album_id.clone();
        }
        let report = album.update(|album, changes| {
            let report = album.photos.merge(photos, MergeOptions::new())?;
            if report.added > 0 {
                changes.record(AlbumField::Photos);
            }
            Ok::<_, StoreError>(report)
        })?;
        Ok(report)
    }

    // ── Status placeholders ──────────────────────────────────────

    pub(crate) fn insert_placeholder(&self, post: Post) -> SyncResult<Shared<Post>> {
        let placeholder = Placeholder {
            local_id: post.id.clone(),
            actor_id: post.actor_id.clone(),
            text: post.message.clone(),
            created: post.created,
            state: PlaceholderState::Pending,
        };
        let entity = self.feed.add(post)?;
        self.placeholders.lock().push(placeholder);
        Ok(entity)
    }

    pub(crate) fn confirm_placeholder(&self, local_id: &EntityId, server_id: Option<EntityId>) {
        {
            let mut placeholders = self.placeholders.lock();
            if let Some(p) = placeholders.iter_mut().find(|p| &p.local_id == local_id) {
                p.state = PlaceholderState::Confirmed(server_id);
            }
        }
        self.reconcile_placeholders();
    }

    pub(crate) fn drop_placeholder(&self, local_id: &EntityId) {
        self.placeholders.lock().retain(|p| &p.local_id != local_id);
        self.feed.remove(local_id);
    }

    /// Status placeholders still shown in the feed.
    pub fn pending_placeholders(&self) -> Vec<EntityId> {
        self.placeholders
            .lock()
            .iter()
            .map(|p| p.local_id.clone())
            .collect()
    }

    /// Retires confirmed placeholders whose server story is in the feed.
    ///
    /// A reported story id must be present. Without one, the oldest
    /// unclaimed story by the same actor with the same text, created no
    /// earlier than the placeholder, is taken; each story retires at most
    /// one placeholder.
    fn reconcile_placeholders(&self) {
        let mut placeholders = self.placeholders.lock();
        if placeholders.is_empty() {
            return;
        }
        let mut claimed: HashSet<EntityId> = placeholders
            .iter()
            .filter_map(|p| match &p.state {
                PlaceholderState::Confirmed(Some(id)) => Some(id.clone()),
                _ => None,
            })
            .collect();
        let mut stories = self.feed.snapshot();
        stories.retain(|s| !s.id().is_local());
        stories.reverse();

        placeholders.retain(|p| {
            let retire = match &p.state {
                PlaceholderState::Pending => false,
                PlaceholderState::Confirmed(Some(server_id)) => self.feed.contains(server_id),
                PlaceholderState::Confirmed(None) => {
                    let matched = stories.iter().find(|story| {
                        let story = story.read();
                        !claimed.contains(&story.id)
                            && story.actor_id == p.actor_id
                            && story.message == p.text
                            && story.created >= p.created
                    });
                    match matched {
                        Some(story) => {
                            claimed.insert(story.id().clone());
                            true
                        }
                        None => false,
                    }
                }
            };
            if retire {
                self.feed.remove(&p.local_id);
                debug!(placeholder = %p.local_id, "status placeholder retired");
            }
            !retire
        });
    }
}
