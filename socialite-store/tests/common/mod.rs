//! Shared test entity for store tests.

#![allow(dead_code)]

use socialite_store::{ChangeSet, Mergeable, MergeableCollection};
use socialite_types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemField {
    Title,
    Rank,
    Children,
}

/// A feed-like record ordered by `rank`, owning a nested collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: EntityId,
    pub title: String,
    pub rank: i64,
    pub children: MergeableCollection<Child>,
}

impl Item {
    pub fn new(id: &str, title: &str, rank: i64) -> Self {
        Self {
            id: EntityId::new(id),
            title: title.to_string(),
            rank,
            children: MergeableCollection::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Child>) -> Self {
        self.children = MergeableCollection::from_items(children).unwrap();
        self
    }
}

impl Mergeable for Item {
    type Field = ItemField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<ItemField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.title, incoming.title, ItemField::Title);
        changes.update(&mut self.rank, incoming.rank, ItemField::Rank);
        let report = self
            .children
            .merge(incoming.children.into_items(), Default::default())
            .unwrap_or_default();
        if report.added > 0 {
            changes.record(ItemField::Children);
        }
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildField {
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub id: EntityId,
    pub text: String,
}

impl Child {
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            id: EntityId::new(id),
            text: text.to_string(),
        }
    }
}

impl Mergeable for Child {
    type Field = ChildField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<ChildField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.text, incoming.text, ChildField::Text);
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// Highest rank first.
pub fn by_rank_desc(a: &Item, b: &Item) -> std::cmp::Ordering {
    b.rank.cmp(&a.rank)
}

pub fn ids(collection: &MergeableCollection<Item>) -> Vec<String> {
    collection.ids().iter().map(|id| id.to_string()).collect()
}
