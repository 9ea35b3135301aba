use serde::{Deserialize, Serialize};
use socialite_store::{ChangeSet, Mergeable};
use socialite_types::EntityId;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityFilterField {
    Name,
    Rank,
    FilterType,
    IsVisible,
}

/// A news-feed filter ("Status Updates", "Photos", a friend list, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub key: EntityId,
    pub name: String,
    pub rank: i32,
    pub filter_type: String,
    pub is_visible: bool,
}

impl ActivityFilter {
    pub fn new(key: impl Into<EntityId>, name: impl Into<String>, rank: i32) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            rank,
            filter_type: String::new(),
            is_visible: true,
        }
    }

    pub fn by_rank(a: &Self, b: &Self) -> Ordering {
        a.rank.cmp(&b.rank).then_with(|| a.key.cmp(&b.key))
    }
}

impl Mergeable for ActivityFilter {
    type Field = ActivityFilterField;

    fn key(&self) -> &EntityId {
        &self.key
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<ActivityFilterField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.name, incoming.name, ActivityFilterField::Name);
        changes.update(&mut self.rank, incoming.rank, ActivityFilterField::Rank);
        changes.update(&mut self.filter_type, incoming.filter_type, ActivityFilterField::FilterType);
        changes.update(&mut self.is_visible, incoming.is_visible, ActivityFilterField::IsVisible);
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.key = id;
    }
}
