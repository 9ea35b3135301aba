use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socialite_store::{ChangeSet, Mergeable};
use socialite_types::EntityId;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationField {
    SenderId,
    Title,
    Description,
    Created,
    Updated,
    IsUnread,
    IsHidden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: EntityId,
    pub sender_id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub is_unread: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Notification {
    pub fn new(
        id: impl Into<EntityId>,
        sender_id: impl Into<EntityId>,
        title: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            title: title.into(),
            description: String::new(),
            created,
            updated: created,
            is_unread: true,
            is_hidden: false,
        }
    }

    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id))
    }
}

impl Mergeable for Notification {
    type Field = NotificationField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<NotificationField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.sender_id, incoming.sender_id, NotificationField::SenderId);
        changes.update(&mut self.title, incoming.title, NotificationField::Title);
        changes.update(&mut self.description, incoming.description, NotificationField::Description);
        changes.update(&mut self.created, incoming.created, NotificationField::Created);
        changes.update(&mut self.updated, incoming.updated, NotificationField::Updated);
        changes.update(&mut self.is_unread, incoming.is_unread, NotificationField::IsUnread);
        changes.update(&mut self.is_hidden, incoming.is_hidden, NotificationField::IsHidden);
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}
