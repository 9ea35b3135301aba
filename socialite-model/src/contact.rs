use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socialite_store::{ChangeSet, Mergeable};
use socialite_types::EntityId;
use std::cmp::Ordering;

/// Chat presence as reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlinePresence {
    Active,
    Idle,
    Offline,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactField {
    Name,
    FirstName,
    LastName,
    ProfileUrl,
    ImageUrl,
    Birthday,
    StatusMessage,
    StatusTime,
    OnlinePresence,
    Updated,
    InterestLevel,
}

/// A person known to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub profile_url: Option<String>,
    pub image_url: Option<String>,
    pub birthday: Option<String>,
    pub status_message: Option<String>,
    pub status_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub online_presence: OnlinePresence,
    pub updated: Option<DateTime<Utc>>,
    /// Local-only ranking of how interesting the user finds this person.
    /// Filled from persistence; the service never sends it.
    #[serde(skip)]
    pub interest_level: Option<f64>,
}

impl Contact {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            first_name: String::new(),
            last_name: String::new(),
            profile_url: None,
            image_url: None,
            birthday: None,
            status_message: None,
            status_time: None,
            online_presence: OnlinePresence::Unknown,
            updated: None,
            interest_level: None,
        }
    }

    /// Most interesting first, then by name.
    pub fn by_interest(a: &Self, b: &Self) -> Ordering {
        let level = |c: &Self| c.interest_level.unwrap_or(0.0);
        level(b)
            .total_cmp(&level(a))
            .then_with(|| a.name.cmp(&b.name))
    }

    pub fn by_name(a: &Self, b: &Self) -> Ordering {
        a.name.cmp(&b.name)
    }
}

impl Mergeable for Contact {
    type Field = ContactField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<ContactField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.name, incoming.name, ContactField::Name);
        changes.update(&mut self.first_name, incoming.first_name, ContactField::FirstName);
        changes.update(&mut self.last_name, incoming.last_name, ContactField::LastName);
        changes.update(&mut self.profile_url, incoming.profile_url, ContactField::ProfileUrl);
        changes.update(&mut self.image_url, incoming.image_url, ContactField::ImageUrl);
        changes.update(&mut self.birthday, incoming.birthday, ContactField::Birthday);
        changes.update(
            &mut self.status_message,
            incoming.status_message,
            ContactField::StatusMessage,
        );
        changes.update(&mut self.status_time, incoming.status_time, ContactField::StatusTime);
        changes.update(
            &mut self.online_presence,
            incoming.online_presence,
            ContactField::OnlinePresence,
        );
        changes.update(&mut self.updated, incoming.updated, ContactField::Updated);
        // Server records never carry a level; only an enriched revision may set one.
        if let Some(level) = incoming.interest_level {
            changes.update(&mut self.interest_level, Some(level), ContactField::InterestLevel);
        }
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}
