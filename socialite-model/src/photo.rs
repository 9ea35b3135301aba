use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use socialite_store::{repair_keys, ChangeSet, Mergeable, MergeOptions, MergeableCollection, StoreResult};
use socialite_types::EntityId;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoTagField {
    ContactId,
    Text,
    Position,
}

/// A person (or free text) tagged at a point on a photo.
///
/// Tags have no server id; the key is derived from the photo and the tagged
/// contact, falling back to the tag text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoTag {
    pub id: EntityId,
    pub photo_id: EntityId,
    pub contact_id: Option<EntityId>,
    pub text: String,
    /// Horizontal position, percent of the photo width.
    pub x: f64,
    /// Vertical position, percent of the photo height.
    pub y: f64,
}

impl PhotoTag {
    pub fn new(
        photo_id: impl Into<EntityId>,
        contact_id: Option<EntityId>,
        text: impl Into<String>,
        x: f64,
        y: f64,
    ) -> Self {
        let photo_id = photo_id.into();
        let text = text.into();
        let id = Self::derive_key(&photo_id, contact_id.as_ref(), &text);
        Self {
            id,
            photo_id,
            contact_id,
            text,
            x,
            y,
        }
    }

    /// `"{photo_id}:{contact_id or text}"`. Invalid when the photo id is.
    pub fn derive_key(photo_id: &EntityId, contact_id: Option<&EntityId>, text: &str) -> EntityId {
        if !photo_id.is_valid() {
            return EntityId::invalid();
        }
        match contact_id.filter(|c| c.is_valid()) {
            Some(contact) => EntityId::new(format!("{photo_id}:{contact}")),
            None => EntityId::new(format!("{photo_id}:{text}")),
        }
    }
}

impl Mergeable for PhotoTag {
    type Field = PhotoTagField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<PhotoTagField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.contact_id, incoming.contact_id, PhotoTagField::ContactId);
        changes.update(&mut self.text, incoming.text, PhotoTagField::Text);
        if self.x != incoming.x || self.y != incoming.y {
            self.x = incoming.x;
            self.y = incoming.y;
            changes.record(PhotoTagField::Position);
        }
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoField {
    AlbumId,
    OwnerId,
    Caption,
    Created,
    Link,
    ImageUrl,
    Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: EntityId,
    pub album_id: EntityId,
    pub owner_id: EntityId,
    pub caption: String,
    pub created: DateTime<Utc>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: MergeableCollection<PhotoTag>,
}

impl Photo {
    pub fn new(
        id: impl Into<EntityId>,
        album_id: impl Into<EntityId>,
        owner_id: impl Into<EntityId>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            album_id: album_id.into(),
            owner_id: owner_id.into(),
            caption: String::new(),
            created,
            link: None,
            image_url: None,
            tags: MergeableCollection::new(),
        }
    }

    /// Attaches tags, re-deriving each tag's key against this photo.
    pub fn with_tags(mut self, tags: Vec<PhotoTag>) -> StoreResult<Self> {
        let tags = tags
            .into_iter()
            .map(|t| PhotoTag::new(self.id.clone(), t.contact_id, t.text, t.x, t.y))
            .collect();
        self.tags = MergeableCollection::from_items(tags)?;
        Ok(self)
    }

    pub fn oldest_first(a: &Self, b: &Self) -> Ordering {
        a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id))
    }
}

impl Mergeable for Photo {
    type Field = PhotoField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<PhotoField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.album_id, incoming.album_id, PhotoField::AlbumId);
        changes.update(&mut self.owner_id, incoming.owner_id, PhotoField::OwnerId);
        changes.update(&mut self.caption, incoming.caption, PhotoField::Caption);
        changes.update(&mut self.created, incoming.created, PhotoField::Created);
        changes.update(&mut self.link, incoming.link, PhotoField::Link);
        changes.update(&mut self.image_url, incoming.image_url, PhotoField::ImageUrl);
        // The service always returns the full tag list for a photo.
        if let Ok(report) = self
            .tags
            .merge(incoming.tags.into_items(), MergeOptions::new().reset_missing())
        {
            if report.added > 0 || report.removed > 0 {
                changes.record(PhotoField::Tags);
            }
        }
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        let tags: Vec<PhotoTag> = self
            .tags
            .values()
            .into_iter()
            .map(|t| PhotoTag::new(id.clone(), t.contact_id, t.text, t.x, t.y))
            .collect();
        self.tags = MergeableCollection::from_items(tags).unwrap_or_default();
        self.id = id;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumField {
    OwnerId,
    Title,
    Description,
    Location,
    Created,
    LastModified,
    PhotoCount,
    CoverPhotoId,
    Photos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: EntityId,
    pub owner_id: EntityId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub photo_count: u32,
    pub cover_photo_id: Option<EntityId>,
    #[serde(default = "photo_list", deserialize_with = "deserialize_photos")]
    pub photos: MergeableCollection<Photo>,
}

fn photo_list() -> MergeableCollection<Photo> {
    MergeableCollection::with_comparison(Photo::oldest_first)
}

fn deserialize_photos<'de, D>(deserializer: D) -> Result<MergeableCollection<Photo>, D::Error>
where
    D: Deserializer<'de>,
{
    let photos = Vec::<Photo>::deserialize(deserializer)?;
    let list = photo_list();
    list.merge(photos, MergeOptions::new())
        .map_err(serde::de::Error::custom)?;
    Ok(list)
}

impl Album {
    pub fn new(
        id: impl Into<EntityId>,
        owner_id: impl Into<EntityId>,
        title: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
            created,
            last_modified: created,
            photo_count: 0,
            cover_photo_id: None,
            photos: photo_list(),
        }
    }

    /// Attaches photos. Photos without a key get a local one, and every
    /// photo is pointed at this album.
    pub fn with_photos(mut self, mut photos: Vec<Photo>) -> StoreResult<Self> {
        repair_keys(&mut photos);
        for photo in &mut photos {
            photo.album_id = self.id.clone();
        }
        self.photos = photo_list();
        self.photos.merge(photos, MergeOptions::new())?;
        Ok(self)
    }

    /// Most recently modified first.
    pub fn recently_modified(a: &Self, b: &Self) -> Ordering {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.id.cmp(&b.id))
    }
}

impl Mergeable for Album {
    type Field = AlbumField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<AlbumField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.owner_id, incoming.owner_id, AlbumField::OwnerId);
        changes.update(&mut self.title, incoming.title, AlbumField::Title);
        changes.update(&mut self.description, incoming.description, AlbumField::Description);
        changes.update(&mut self.location, incoming.location, AlbumField::Location);
        changes.update(&mut self.created, incoming.created, AlbumField::Created);
        changes.update(&mut self.last_modified, incoming.last_modified, AlbumField::LastModified);
        changes.update(&mut self.photo_count, incoming.photo_count, AlbumField::PhotoCount);
        changes.update(&mut self.cover_photo_id, incoming.cover_photo_id, AlbumField::CoverPhotoId);
        // Album listings arrive without photos; those are fetched separately
        // and must not be dropped by a listing refresh.
        if let Ok(report) = self
            .photos
            .merge(incoming.photos.into_items(), MergeOptions::new())
        {
            if report.added > 0 {
                changes.record(AlbumField::Photos);
            }
        }
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        for photo in self.photos.snapshot() {
            photo.update(|p, changes| {
                changes.update(&mut p.album_id, id.clone(), PhotoField::AlbumId)
            });
        }
        self.id = id;
    }
}
