//! User actions.
//!
//! Every action that changes server state is applied to the local graph
//! first, queued on the user-interaction queue, and reverted if the service
//! rejects it. The returned [`ActionTicket`] resolves with the remote
//! outcome.

use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::graph::GraphStore;
use crate::optimistic::{run_optimistic, OptimisticMutation};
use crate::worker::QueueKind;
use chrono::Utc;
use socialite_model::{
    AlbumField, Comment, ContactField, NotificationField, Photo, PhotoField, PhotoTag, Post,
    PostField,
};
use socialite_store::{Shared, StoreError, Tracked};
use socialite_types::EntityId;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Pending outcome of a queued action.
#[must_use = "dropping a ticket does not cancel the action, but its outcome is lost"]
pub struct ActionTicket<T> {
    rx: oneshot::Receiver<SyncResult<T>>,
}

impl<T> ActionTicket<T> {
    fn channel() -> (oneshot::Sender<SyncResult<T>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn ready(result: SyncResult<T>) -> Self {
        let (tx, ticket) = Self::channel();
        let _ = tx.send(result);
        ticket
    }

    /// Blocks until the action settles. Must not be called from async code.
    pub fn wait(self) -> SyncResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(SyncError::Cancelled))
    }

    pub async fn wait_async(self) -> SyncResult<T> {
        self.rx.await.unwrap_or_else(|_| Err(SyncError::Cancelled))
    }
}

fn settle_ticket<T>(prepared: SyncResult<ActionTicket<T>>) -> ActionTicket<T> {
    prepared.unwrap_or_else(|err| ActionTicket::ready(Err(err)))
}

impl GraphStore {
    /// Runs `work` on the user-interaction queue, publishing a
    /// [`SyncEvent::MutationFailed`] if it fails.
    fn submit<T: Send + 'static>(
        self: &Arc<Self>,
        action: &'static str,
        entity: EntityId,
        work: impl FnOnce(&GraphStore) -> SyncResult<T> + Send + 'static,
    ) -> ActionTicket<T> {
        let (tx, ticket) = ActionTicket::channel();
        let store = Arc::clone(self);
        let queued = self
            .queues()
            .queue_request(QueueKind::UserInteraction, action, move || {
                let result = work(&store);
                if let Err(err) = &result {
                    store.emit(SyncEvent::MutationFailed {
                        action: action.to_string(),
                        entity,
                        error: err.to_string(),
                    });
                }
                let _ = tx.send(result);
                Ok(())
            });
        match queued {
            Ok(()) => ticket,
            Err(err) => ActionTicket::ready(Err(err.into())),
        }
    }

    // ── Likes ────────────────────────────────────────────────────

    pub fn add_like(self: &Arc<Self>, post_id: &EntityId) -> ActionTicket<()> {
        settle_ticket(self.set_like(post_id, true))
    }

    pub fn remove_like(self: &Arc<Self>, post_id: &EntityId) -> ActionTicket<()> {
        settle_ticket(self.set_like(post_id, false))
    }

    fn set_like(self: &Arc<Self>, post_id: &EntityId, liked: bool) -> SyncResult<ActionTicket<()>> {
        self.session().require_online()?;
        let post = self.require_post(post_id)?;
        let mutation = OptimisticMutation::begin(
            &post,
            move |post, changes| {
                if post.has_liked == liked {
                    return None;
                }
                let before = post.like_count;
                let count = if liked {
                    before.saturating_add(1)
                } else {
                    before.saturating_sub(1)
                };
                changes.update(&mut post.has_liked, liked, PostField::HasLiked);
                changes.update(&mut post.like_count, count, PostField::LikeCount);
                Some((before, count))
            },
            // Fields a merge has overwritten since the apply are left alone.
            move |post: &mut Post, changes, applied: Option<(u32, u32)>| {
                let Some((before, count)) = applied else {
                    return;
                };
                if post.has_liked == liked {
                    changes.update(&mut post.has_liked, !liked, PostField::HasLiked);
                }
                if post.like_count == count {
                    changes.update(&mut post.like_count, before, PostField::LikeCount);
                }
            },
        )?;
        let action = if liked { "add_like" } else { "remove_like" };
        Ok(self.submit(action, post_id.clone(), move |store| {
            let id = mutation.entity().id().clone();
            let outcome = if liked {
                store.service().add_like(&id)
            } else {
                store.service().remove_like(&id)
            };
            mutation.settle(outcome.map_err(SyncError::from))
        }))
    }

    // ── Comments ─────────────────────────────────────────────────

    /// Adds a comment. A placeholder appears in the thread at once and takes
    /// the server id when the service accepts it.
    pub fn add_comment(self: &Arc<Self>, post_id: &EntityId, text: impl Into<String>) -> ActionTicket<EntityId> {
        settle_ticket(self.try_add_comment(post_id, text.into()))
    }

    fn try_add_comment(self: &Arc<Self>, post_id: &EntityId, text: String) -> SyncResult<ActionTicket<EntityId>> {
        let me = self.session().require_online()?;
        let post = self.require_post(post_id)?;
        let mut placeholder = Comment::new(EntityId::synthesize(), post_id.clone(), me, text.clone(), Utc::now());
        placeholder.can_remove = true;
        let local_id = placeholder.id.clone();

        let revert_id = local_id.clone();
        let mutation = OptimisticMutation::begin(
            &post,
            move |post, changes| {
                if post.comments.add(placeholder).is_err() {
                    return None;
                }
                let before = post.comment_count;
                let count = before.saturating_add(1);
                changes.record(PostField::Comments);
                changes.update(&mut post.comment_count, count, PostField::CommentCount);
                Some((before, count))
            },
            move |post: &mut Post, changes, applied: Option<(u32, u32)>| {
                if post.comments.remove(&revert_id).is_some() {
                    changes.record(PostField::Comments);
                }
                if let Some((before, count)) = applied {
                    if post.comment_count == count {
                        changes.update(&mut post.comment_count, before, PostField::CommentCount);
                    }
                }
            },
        )?;

        Ok(self.submit("add_comment", post_id.clone(), move |store| {
            let post = mutation.entity().clone();
            let outcome = store
                .service()
                .add_comment(post.id(), &text)
                .map_err(SyncError::from);
            let server_id = mutation.settle(outcome)?;
            post.update(|post, changes| {
                if let Some(placeholder) = post.comments.remove(&local_id) {
                    let mut confirmed = placeholder.snapshot();
                    confirmed.id = server_id.clone();
                    if let Err(err) = post.comments.add(confirmed) {
                        warn!(comment = %server_id, error = %err, "could not confirm comment");
                    }
                    changes.record(PostField::Comments);
                }
            });
            debug!(post = %post.id(), comment = %server_id, "comment confirmed");
            Ok(server_id)
        }))
    }

    pub fn remove_comment(self: &Arc<Self>, post_id: &EntityId, comment_id: &EntityId) -> ActionTicket<()> {
        settle_ticket(self.try_remove_comment(post_id, comment_id))
    }

    fn try_remove_comment(self: &Arc<Self>, post_id: &EntityId, comment_id: &EntityId) -> SyncResult<ActionTicket<()>> {
        self.session().require_online()?;
        let post = self.require_post(post_id)?;
        if !post.read().comments.contains(comment_id) {
            return Err(SyncError::Store(StoreError::NotFound(comment_id.clone())));
        }
        let target = comment_id.clone();
        let mutation = OptimisticMutation::begin(
            &post,
            move |post, changes| {
                let Some(removed) = post.comments.remove(&target) else {
                    return None;
                };
                let before = post.comment_count;
                let count = before.saturating_sub(1);
                changes.record(PostField::Comments);
                changes.update(&mut post.comment_count, count, PostField::CommentCount);
                Some((removed, before, count))
            },
            |post: &mut Post, changes, applied: Option<(Shared<Comment>, u32, u32)>| {
                let Some((comment, before, count)) = applied else {
                    return;
                };
                if matches!(post.comments.add_shared(comment), Ok(true)) {
                    changes.record(PostField::Comments);
                }
                if post.comment_count == count {
                    changes.update(&mut post.comment_count, before, PostField::CommentCount);
                }
            },
        )?;
        let comment_id = comment_id.clone();
        Ok(self.submit("remove_comment", comment_id.clone(), move |store| {
            let outcome = store
                .service()
                .remove_comment(&comment_id)
                .map_err(SyncError::from);
            mutation.settle(outcome)
        }))
    }

    // ── Status ───────────────────────────────────────────────────

    /// Posts a status update. Resolves with the server story id when the
    /// service reports one.
    ///
    /// A placeholder story is shown at the top of the feed until the server
    /// story arrives in a later feed refresh.
    pub fn update_status(self: &Arc<Self>, text: impl Into<String>) -> ActionTicket<Option<EntityId>> {
        settle_ticket(self.try_update_status(text.into()))
    }

    fn try_update_status(self: &Arc<Self>, text: String) -> SyncResult<ActionTicket<Option<EntityId>>> {
        let me = self.session().require_online()?;
        let created = Utc::now();

        let status = match self.me() {
            Some(contact) => {
                let message = text.clone();
                let applied = text.clone();
                Some(OptimisticMutation::begin(
                    &contact,
                    move |contact, changes| {
                        let before = (contact.status_message.clone(), contact.status_time);
                        changes.update(&mut contact.status_message, Some(message), ContactField::StatusMessage);
                        changes.update(&mut contact.status_time, Some(created), ContactField::StatusTime);
                        before
                    },
                    move |contact, changes, (message, time)| {
                        // A newer status merged from the service stays.
                        if contact.status_message.as_deref() != Some(applied.as_str())
                            || contact.status_time != Some(created)
                        {
                            return;
                        }
                        changes.update(&mut contact.status_message, message, ContactField::StatusMessage);
                        changes.update(&mut contact.status_time, time, ContactField::StatusTime);
                    },
                )?)
            }
            None => None,
        };

        let placeholder = Post::new(EntityId::synthesize(), me.clone(), text.clone(), created);
        let local_id = placeholder.id.clone();
        self.insert_placeholder(placeholder)?;

        Ok(self.submit("update_status", me, move |store| {
            let outcome = store
                .service()
                .update_status(&text)
                .map_err(SyncError::from);
            match &outcome {
                Ok(server_id) => store.confirm_placeholder(&local_id, server_id.clone()),
                Err(_) => store.drop_placeholder(&local_id),
            }
            match status {
                Some(mutation) => mutation.settle(outcome),
                None => outcome,
            }
        }))
    }

    // ── Photos ───────────────────────────────────────────────────

    /// Tags a contact (or free text) at a position of a photo.
    pub fn tag_photo(
        self: &Arc<Self>,
        photo_id: &EntityId,
        contact_id: Option<EntityId>,
        text: impl Into<String>,
        x: f64,
        y: f64,
    ) -> ActionTicket<()> {
        settle_ticket(self.try_tag_photo(photo_id, contact_id, text.into(), x, y))
    }

    fn try_tag_photo(
        self: &Arc<Self>,
        photo_id: &EntityId,
        contact_id: Option<EntityId>,
        text: String,
        x: f64,
        y: f64,
    ) -> SyncResult<ActionTicket<()>> {
        self.session().require_online()?;
        let photo = self
            .photo(photo_id)
            .ok_or_else(|| SyncError::Store(StoreError::NotFound(photo_id.clone())))?;
        let tag = PhotoTag::new(photo_id.clone(), contact_id.clone(), text.clone(), x, y);
        let tag_id = tag.id.clone();
        let mutation = OptimisticMutation::begin(
            &photo,
            move |photo, changes| {
                let prior = photo.tags.find(&tag.id).map(|resident| resident.snapshot());
                if photo.tags.add(tag).is_ok() && prior.is_none() {
                    changes.record(PhotoField::Tags);
                }
                prior
            },
            move |photo: &mut Photo, changes, prior: Option<PhotoTag>| match prior {
                // Re-tag: move the resident tag back.
                Some(prior) => {
                    if let Err(err) = photo.tags.add(prior) {
                        warn!(tag = %tag_id, error = %err, "could not restore photo tag");
                    }
                }
                None => {
                    if photo.tags.remove(&tag_id).is_some() {
                        changes.record(PhotoField::Tags);
                    }
                }
            },
        )?;
        Ok(self.submit("tag_photo", photo_id.clone(), move |store| {
            let outcome = store
                .service()
                .add_photo_tag(mutation.entity().id(), contact_id.as_ref(), &text, x, y)
                .map_err(SyncError::from);
            mutation.settle(outcome)
        }))
    }

    /// Uploads a photo. Nothing changes locally until the service accepts
    /// it; the photo then joins its album if that album is loaded.
    pub fn upload_photo(
        self: &Arc<Self>,
        album_id: Option<EntityId>,
        path: impl Into<PathBuf>,
        caption: impl Into<String>,
    ) -> ActionTicket<Shared<Photo>> {
        let path = path.into();
        let caption = caption.into();
        let target = album_id.clone().unwrap_or_else(EntityId::invalid);
        settle_ticket(self.session().require_online().map(|_| {
            self.submit("upload_photo", target, move |store| {
                let photo = store
                    .service()
                    .upload_photo(album_id.as_ref(), &path, &caption)?;
                match store.album(&photo.album_id) {
                    Some(album) => Ok(album.update(|album, changes| {
                        let entity = album.photos.add(photo)?;
                        changes.record(AlbumField::Photos);
                        let count = album.photo_count.saturating_add(1);
                        changes.update(&mut album.photo_count, count, AlbumField::PhotoCount);
                        Ok::<_, StoreError>(entity)
                    })?),
                    None => Ok(Tracked::new(photo)),
                }
            })
        }))
    }

    // ── Local-only state ─────────────────────────────────────────

    /// Marks a notification read locally. The mark survives refreshes until
    /// the service reports the notification read too.
    pub fn mark_notification_read(&self, id: &EntityId) -> SyncResult<()> {
        let notification = self
            .notifications()
            .find(id)
            .ok_or_else(|| SyncError::Store(StoreError::NotFound(id.clone())))?;
        notification.update(|n, changes| changes.update(&mut n.is_unread, false, NotificationField::IsUnread));
        self.persistence().mark_notification_read(id)?;
        Ok(())
    }

    /// Records how interesting a contact is. `None` clears the level.
    ///
    /// The friend list reorders at once; the level is withdrawn again if it
    /// cannot be persisted.
    pub fn set_interest_level(&self, contact_id: &EntityId, level: Option<f64>) -> SyncResult<()> {
        let contact = self.contact(contact_id);
        run_optimistic(
            || {
                contact.as_ref().map(|contact| {
                    let before = contact.read().interest_level;
                    contact.update(|c, changes| changes.update(&mut c.interest_level, level, ContactField::InterestLevel));
                    self.friends().refresh_sort();
                    before
                })
            },
            |before| {
                if let (Some(contact), Some(before)) = (&contact, before) {
                    contact.update(|c, changes| changes.update(&mut c.interest_level, before, ContactField::InterestLevel));
                    self.friends().refresh_sort();
                }
            },
            || Ok(self.persistence().set_interest_level(contact_id, level)?),
        )
    }
}
