//! Remote service boundary.
//!
//! Calls are blocking and run on worker-queue threads. Implementations
//! return transient entities; the store merges them into the canonical
//! graph. HTTP, request signing and wire parsing live behind this trait.

use socialite_model::{ActivityFilter, Album, Contact, Notification, Photo, Post};
use socialite_types::EntityId;
use std::path::Path;
use thiserror::Error;

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote call failed ({code}): {message}")]
pub struct RemoteError {
    /// Service error code; `0` when the request never got an answer.
    pub code: i32,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The request did not reach the service.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The social-network API as seen by the sync engine.
pub trait RemoteService: Send + Sync {
    fn get_user(&self, user_id: &EntityId) -> RemoteResult<Contact>;

    fn get_friends(&self, user_id: &EntityId) -> RemoteResult<Vec<Contact>>;

    /// Newest stories first, optionally restricted to a stream filter.
    fn get_stream(&self, filter: Option<&EntityId>, limit: usize) -> RemoteResult<Vec<Post>>;

    fn get_filters(&self) -> RemoteResult<Vec<ActivityFilter>>;

    fn get_notifications(&self, include_read: bool) -> RemoteResult<Vec<Notification>>;

    fn get_albums(&self, owner_id: &EntityId) -> RemoteResult<Vec<Album>>;

    fn get_photos(&self, album_id: &EntityId, limit: usize) -> RemoteResult<Vec<Photo>>;

    /// Returns the id the service assigned to the new comment.
    fn add_comment(&self, post_id: &EntityId, text: &str) -> RemoteResult<EntityId>;

    fn remove_comment(&self, comment_id: &EntityId) -> RemoteResult<()>;

    fn add_like(&self, post_id: &EntityId) -> RemoteResult<()>;

    fn remove_like(&self, post_id: &EntityId) -> RemoteResult<()>;

    /// Returns the id of the created story when the service reports one.
    fn update_status(&self, text: &str) -> RemoteResult<Option<EntityId>>;

    fn add_photo_tag(
        &self,
        photo_id: &EntityId,
        contact_id: Option<&EntityId>,
        text: &str,
        x: f64,
        y: f64,
    ) -> RemoteResult<()>;

    /// Uploads an image file. `album_id` of `None` targets the default album.
    fn upload_photo(
        &self,
        album_id: Option<&EntityId>,
        path: &Path,
        caption: &str,
    ) -> RemoteResult<Photo>;
}

/// A scripted in-memory service for tests.
pub mod mock {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use socialite_model::PhotoTag;
    use std::collections::{HashMap, VecDeque};

    /// Identifies a [`RemoteService`] method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Call {
        GetUser,
        GetFriends,
        GetStream,
        GetFilters,
        GetNotifications,
        GetAlbums,
        GetPhotos,
        AddComment,
        RemoveComment,
        AddLike,
        RemoveLike,
        UpdateStatus,
        AddPhotoTag,
        UploadPhoto,
    }

    type Hook = Box<dyn Fn() + Send + Sync>;

    #[derive(Default)]
    struct Script {
        users: HashMap<EntityId, Contact>,
        friends: Vec<Contact>,
        stream: Vec<Post>,
        filters: Vec<ActivityFilter>,
        notifications: Vec<Notification>,
        albums: HashMap<EntityId, Vec<Album>>,
        photos: HashMap<EntityId, Vec<Photo>>,
        calls: HashMap<Call, usize>,
        stream_limits: Vec<usize>,
        fail_next: HashMap<Call, VecDeque<RemoteError>>,
        fail_always: HashMap<Call, RemoteError>,
        hooks: HashMap<Call, Hook>,
        status_without_id: bool,
        next_id: u64,
    }

    /// Serves scripted data and records every call.
    ///
    /// Mutations are applied to the scripted data, so a later fetch reflects
    /// them the way the real service would.
    pub struct MockService {
        me: EntityId,
        script: Mutex<Script>,
    }

    impl MockService {
        /// A service whose authenticated user is `me`.
        pub fn new(me: impl Into<EntityId>) -> Self {
            let me = me.into();
            let mut script = Script::default();
            script
                .users
                .insert(me.clone(), Contact::new(me.clone(), "Me"));
            Self {
                me,
                script: Mutex::new(script),
            }
        }

        pub fn me(&self) -> &EntityId {
            &self.me
        }

        pub fn set_user(&self, contact: Contact) {
            self.script.lock().users.insert(contact.id.clone(), contact);
        }

        pub fn set_friends(&self, friends: Vec<Contact>) {
            self.script.lock().friends = friends;
        }

        pub fn set_stream(&self, posts: Vec<Post>) {
            self.script.lock().stream = posts;
        }

        pub fn set_filters(&self, filters: Vec<ActivityFilter>) {
            self.script.lock().filters = filters;
        }

        pub fn set_notifications(&self, notifications: Vec<Notification>) {
            self.script.lock().notifications = notifications;
        }

        pub fn set_albums(&self, owner_id: impl Into<EntityId>, albums: Vec<Album>) {
            self.script.lock().albums.insert(owner_id.into(), albums);
        }

        pub fn set_photos(&self, album_id: impl Into<EntityId>, photos: Vec<Photo>) {
            self.script.lock().photos.insert(album_id.into(), photos);
        }

        /// `update_status` succeeds without reporting the new story id.
        pub fn omit_status_ids(&self) {
            self.script.lock().status_without_id = true;
        }

        /// Fails the next call of `call` with `error`. Queues up.
        pub fn fail_next(&self, call: Call, error: RemoteError) {
            self.script
                .lock()
                .fail_next
                .entry(call)
                .or_default()
                .push_back(error);
        }

        /// Fails every call of `call` until [`clear_failures`](Self::clear_failures).
        pub fn fail_always(&self, call: Call, error: RemoteError) {
            self.script.lock().fail_always.insert(call, error);
        }

        pub fn clear_failures(&self) {
            let mut script = self.script.lock();
            script.fail_next.clear();
            script.fail_always.clear();
        }

        /// Runs `hook` after every call of `call`, before it returns.
        pub fn on_call(&self, call: Call, hook: impl Fn() + Send + Sync + 'static) {
            self.script.lock().hooks.insert(call, Box::new(hook));
        }

        /// Number of times `call` was made.
        pub fn calls(&self, call: Call) -> usize {
            self.script.lock().calls.get(&call).copied().unwrap_or(0)
        }

        /// The `limit` of every `get_stream` call, in order.
        pub fn stream_limits(&self) -> Vec<usize> {
            self.script.lock().stream_limits.clone()
        }

        /// Current scripted stream, including mutations applied by calls.
        pub fn stream(&self) -> Vec<Post> {
            self.script.lock().stream.clone()
        }

        fn call<T>(&self, call: Call, f: impl FnOnce(&mut Script) -> RemoteResult<T>) -> RemoteResult<T> {
            let result = {
                let mut script = self.script.lock();
                *script.calls.entry(call).or_default() += 1;
                let injected = script
                    .fail_next
                    .get_mut(&call)
                    .and_then(VecDeque::pop_front)
                    .or_else(|| script.fail_always.get(&call).cloned());
                match injected {
                    Some(err) => Err(err),
                    None => f(&mut script),
                }
            };
            // Hooks run unlocked so they may call back into the mock.
            let hook = self.script.lock().hooks.remove(&call);
            if let Some(hook) = hook {
                hook();
                self.script.lock().hooks.entry(call).or_insert(hook);
            }
            result
        }

        fn next_id(script: &mut Script, prefix: &str) -> EntityId {
            script.next_id += 1;
            EntityId::new(format!("{prefix}-{}", script.next_id))
        }
    }

    fn find_post<'a>(script: &'a mut Script, post_id: &EntityId) -> RemoteResult<&'a mut Post> {
        script
            .stream
            .iter_mut()
            .find(|p| &p.id == post_id)
            .ok_or_else(|| RemoteError::new(100, format!("unknown post {post_id}")))
    }

    impl RemoteService for MockService {
        fn get_user(&self, user_id: &EntityId) -> RemoteResult<Contact> {
            self.call(Call::GetUser, |s| {
                s.users
                    .get(user_id)
                    .cloned()
                    .ok_or_else(|| RemoteError::new(100, format!("unknown user {user_id}")))
            })
        }

        fn get_friends(&self, _user_id: &EntityId) -> RemoteResult<Vec<Contact>> {
            self.call(Call::GetFriends, |s| Ok(s.friends.clone()))
        }

        fn get_stream(&self, _filter: Option<&EntityId>, limit: usize) -> RemoteResult<Vec<Post>> {
            self.call(Call::GetStream, |s| {
                s.stream_limits.push(limit);
                let mut posts = s.stream.clone();
                posts.sort_by(Post::newest_first);
                posts.truncate(limit);
                Ok(posts)
            })
        }

        fn get_filters(&self) -> RemoteResult<Vec<ActivityFilter>> {
            self.call(Call::GetFilters, |s| Ok(s.filters.clone()))
        }

        fn get_notifications(&self, include_read: bool) -> RemoteResult<Vec<Notification>> {
            self.call(Call::GetNotifications, |s| {
                Ok(s.notifications
                    .iter()
                    .filter(|n| include_read || n.is_unread)
                    .cloned()
                    .collect())
            })
        }

        fn get_albums(&self, owner_id: &EntityId) -> RemoteResult<Vec<Album>> {
            self.call(Call::GetAlbums, |s| {
                Ok(s.albums.get(owner_id).cloned().unwrap_or_default())
            })
        }

        fn get_photos(&self, album_id: &EntityId, limit: usize) -> RemoteResult<Vec<Photo>> {
            self.call(Call::GetPhotos, |s| {
                let mut photos = s.photos.get(album_id).cloned().unwrap_or_default();
                photos.truncate(limit);
                Ok(photos)
            })
        }

        fn add_comment(&self, post_id: &EntityId, text: &str) -> RemoteResult<EntityId> {
            let me = self.me.clone();
            self.call(Call::AddComment, |s| {
                let id = Self::next_id(s, "comment");
                let post = find_post(s, post_id)?;
                let comment = socialite_model::Comment::new(id.clone(), post_id.clone(), me, text, Utc::now());
                post.comments.add(comment).map_err(|e| RemoteError::new(1, e.to_string()))?;
                post.comment_count += 1;
                Ok(id)
            })
        }

        fn remove_comment(&self, comment_id: &EntityId) -> RemoteResult<()> {
            self.call(Call::RemoveComment, |s| {
                for post in &mut s.stream {
                    if post.comments.remove(comment_id).is_some() {
                        post.comment_count = post.comment_count.saturating_sub(1);
                        return Ok(());
                    }
                }
                Err(RemoteError::new(100, format!("unknown comment {comment_id}")))
            })
        }

        fn add_like(&self, post_id: &EntityId) -> RemoteResult<()> {
            self.call(Call::AddLike, |s| {
                let post = find_post(s, post_id)?;
                if !post.has_liked {
                    post.has_liked = true;
                    post.like_count += 1;
                }
                Ok(())
            })
        }

        fn remove_like(&self, post_id: &EntityId) -> RemoteResult<()> {
            self.call(Call::RemoveLike, |s| {
                let post = find_post(s, post_id)?;
                if post.has_liked {
                    post.has_liked = false;
                    post.like_count = post.like_count.saturating_sub(1);
                }
                Ok(())
            })
        }

        fn update_status(&self, text: &str) -> RemoteResult<Option<EntityId>> {
            let me = self.me.clone();
            self.call(Call::UpdateStatus, |s| {
                let id = Self::next_id(s, "post");
                s.stream.push(Post::new(id.clone(), me.clone(), text, Utc::now()));
                if let Some(user) = s.users.get_mut(&me) {
                    user.status_message = Some(text.to_string());
                }
                Ok((!s.status_without_id).then_some(id))
            })
        }

        fn add_photo_tag(
            &self,
            photo_id: &EntityId,
            contact_id: Option<&EntityId>,
            text: &str,
            x: f64,
            y: f64,
        ) -> RemoteResult<()> {
            self.call(Call::AddPhotoTag, |s| {
                let photo = s
                    .photos
                    .values_mut()
                    .flat_map(|photos| photos.iter_mut())
                    .find(|p| &p.id == photo_id)
                    .ok_or_else(|| RemoteError::new(100, format!("unknown photo {photo_id}")))?;
                let tag = PhotoTag::new(photo_id.clone(), contact_id.cloned(), text, x, y);
                photo.tags.add(tag).map_err(|e| RemoteError::new(1, e.to_string()))?;
                Ok(())
            })
        }

        fn upload_photo(
            &self,
            album_id: Option<&EntityId>,
            path: &Path,
            caption: &str,
        ) -> RemoteResult<Photo> {
            let me = self.me.clone();
            self.call(Call::UploadPhoto, |s| {
                let album_id = album_id
                    .cloned()
                    .unwrap_or_else(|| EntityId::new(format!("{me}-profile")));
                let id = Self::next_id(s, "photo");
                let mut photo = Photo::new(id, album_id.clone(), me.clone(), Utc::now());
                photo.caption = caption.to_string();
                photo.link = Some(path.display().to_string());
                s.photos.entry(album_id).or_default().push(photo.clone());
                Ok(photo)
            })
        }
    }
}
