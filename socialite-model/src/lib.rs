//! Domain entities for Socialite.
//!
//! Every entity implements [`Mergeable`](socialite_store::Mergeable) with its
//! own field enum, so observers learn exactly which attribute changed:
//! - [`Contact`]: a person: friend, post actor, comment author, photo owner
//! - [`Post`] / [`Comment`]: news-feed stories and their comment threads
//! - [`Album`] / [`Photo`] / [`PhotoTag`]: photo albums, photos and tags
//! - [`Notification`]: items in the notification list
//! - [`ActivityFilter`]: stream filters offered by the service
//!
//! References between entities are plain [`EntityId`](socialite_types::EntityId)
//! values resolved through a directory, never owning pointers. Dependent
//! children (comments, photos, tags) live in nested
//! [`MergeableCollection`](socialite_store::MergeableCollection)s and are
//! merged recursively.

mod contact;
mod filter;
mod notification;
mod photo;
mod post;

pub use contact::{Contact, ContactField, OnlinePresence};
pub use filter::{ActivityFilter, ActivityFilterField};
pub use notification::{Notification, NotificationField};
pub use photo::{Album, AlbumField, Photo, PhotoField, PhotoTag, PhotoTagField};
pub use post::{Comment, CommentField, Post, PostField};
