use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use socialite_store::{repair_keys, ChangeSet, Mergeable, MergeOptions, MergeableCollection, StoreResult};
use socialite_types::EntityId;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostField {
    ActorId,
    TargetId,
    Message,
    Created,
    Updated,
    CommentCount,
    CanComment,
    CanRemoveComments,
    LikeCount,
    HasLiked,
    CanLike,
    AttachmentCaption,
    /// Comments were added to or removed from the thread.
    Comments,
}

/// A news-feed story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub actor_id: EntityId,
    pub target_id: Option<EntityId>,
    pub message: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub comment_count: u32,
    pub can_comment: bool,
    pub can_remove_comments: bool,
    pub like_count: u32,
    pub has_liked: bool,
    pub can_like: bool,
    pub attachment_caption: Option<String>,
    #[serde(default = "comment_thread", deserialize_with = "deserialize_thread")]
    pub comments: MergeableCollection<Comment>,
}

fn comment_thread() -> MergeableCollection<Comment> {
    MergeableCollection::with_comparison(Comment::oldest_first)
}

fn deserialize_thread<'de, D>(deserializer: D) -> Result<MergeableCollection<Comment>, D::Error>
where
    D: Deserializer<'de>,
{
    let comments = Vec::<Comment>::deserialize(deserializer)?;
    let thread = comment_thread();
    thread
        .merge(comments, MergeOptions::new())
        .map_err(serde::de::Error::custom)?;
    Ok(thread)
}

impl Post {
    pub fn new(
        id: impl Into<EntityId>,
        actor_id: impl Into<EntityId>,
        message: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            actor_id: actor_id.into(),
            target_id: None,
            message: message.into(),
            created,
            updated: created,
            comment_count: 0,
            can_comment: true,
            can_remove_comments: false,
            like_count: 0,
            has_liked: false,
            can_like: true,
            attachment_caption: None,
            comments: comment_thread(),
        }
    }

    /// Attaches a comment thread. Comments without a key get a local one,
    /// and every comment is pointed at this post.
    pub fn with_comments(mut self, mut comments: Vec<Comment>) -> StoreResult<Self> {
        repair_keys(&mut comments);
        for comment in &mut comments {
            comment.post_id = self.id.clone();
        }
        self.comments = comment_thread();
        self.comments.merge(comments, MergeOptions::new())?;
        Ok(self)
    }

    /// Feed order: newest story first.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id))
    }
}

impl Mergeable for Post {
    type Field = PostField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<PostField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.actor_id, incoming.actor_id, PostField::ActorId);
        changes.update(&mut self.target_id, incoming.target_id, PostField::TargetId);
        changes.update(&mut self.message, incoming.message, PostField::Message);
        changes.update(&mut self.created, incoming.created, PostField::Created);
        changes.update(&mut self.updated, incoming.updated, PostField::Updated);
        changes.update(&mut self.comment_count, incoming.comment_count, PostField::CommentCount);
        changes.update(&mut self.can_comment, incoming.can_comment, PostField::CanComment);
        changes.update(
            &mut self.can_remove_comments,
            incoming.can_remove_comments,
            PostField::CanRemoveComments,
        );
        changes.update(&mut self.like_count, incoming.like_count, PostField::LikeCount);
        changes.update(&mut self.has_liked, incoming.has_liked, PostField::HasLiked);
        changes.update(&mut self.can_like, incoming.can_like, PostField::CanLike);
        changes.update(
            &mut self.attachment_caption,
            incoming.attachment_caption,
            PostField::AttachmentCaption,
        );
        // Keys were validated when the incoming thread was built.
        if let Ok(report) = self
            .comments
            .merge(incoming.comments.into_items(), MergeOptions::new())
        {
            if report.added > 0 {
                changes.record(PostField::Comments);
            }
        }
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        for comment in self.comments.snapshot() {
            comment.update(|c, changes| {
                changes.update(&mut c.post_id, id.clone(), CommentField::PostId)
            });
        }
        self.id = id;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentField {
    PostId,
    FromId,
    Text,
    Time,
    CanRemove,
}

/// A comment on a [`Post`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub from_id: EntityId,
    pub text: String,
    pub time: DateTime<Utc>,
    pub can_remove: bool,
}

impl Comment {
    pub fn new(
        id: impl Into<EntityId>,
        post_id: impl Into<EntityId>,
        from_id: impl Into<EntityId>,
        text: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            post_id: post_id.into(),
            from_id: from_id.into(),
            text: text.into(),
            time,
            can_remove: false,
        }
    }

    pub fn oldest_first(a: &Self, b: &Self) -> Ordering {
        a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id))
    }
}

impl Mergeable for Comment {
    type Field = CommentField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<CommentField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.post_id, incoming.post_id, CommentField::PostId);
        changes.update(&mut self.from_id, incoming.from_id, CommentField::FromId);
        changes.update(&mut self.text, incoming.text, CommentField::Text);
        changes.update(&mut self.time, incoming.time, CommentField::Time);
        changes.update(&mut self.can_remove, incoming.can_remove, CommentField::CanRemove);
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}
