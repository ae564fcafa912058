use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::profiles::ProfileCard;
use crate::types::{ContentItem, GeoPoint};

/// One row of the viewer's feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub id: String,
    pub creator: ProfileCard,
    pub title: String,
    pub caption: String,
    pub photo_url: Option<String>,
    pub path: Vec<GeoPoint>,
    pub likes: u64,
    pub comments: u64,
    pub viewer_has_liked: bool,
    pub created_at: DateTime<Utc>,
}

/// Items that joined or left the feed with the latest content snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FeedDiff {
    pub entered: Vec<String>,
    pub left: Vec<String>,
}

/// Pure fold of content snapshots, like markers and creator profiles.
///
/// Items are keyed by id, so repeated or overlapping snapshots replace rather
/// than duplicate entries.
#[derive(Debug, Clone)]
pub struct FeedState {
    items: BTreeMap<String, ContentItem>,
    liked: HashMap<String, bool>,
    creators: HashMap<String, ProfileCard>,
    placeholder_name: String,
}

impl FeedState {
    pub fn new(placeholder_name: impl Into<String>) -> Self {
        Self {
            items: BTreeMap::new(),
            liked: HashMap::new(),
            creators: HashMap::new(),
            placeholder_name: placeholder_name.into(),
        }
    }

    /// Ids in `items` that are not in the feed yet.
    pub fn entering(&self, items: &[ContentItem]) -> Vec<String> {
        let incoming: BTreeSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        incoming
            .into_iter()
            .filter(|id| !self.items.contains_key(*id))
            .map(str::to_string)
            .collect()
    }

    /// Replaces the item set with a full query result.
    pub fn replace_items(&mut self, items: Vec<ContentItem>) -> FeedDiff {
        let incoming: BTreeSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        let left: Vec<String> = self
            .items
            .keys()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect();
        let entered = self.entering(&items);

        for id in &left {
            self.items.remove(id);
            self.liked.remove(id);
        }
        for item in items {
            self.upsert(item);
        }
        FeedDiff { entered, left }
    }

    /// Inserts or replaces a single item.
    pub fn upsert(&mut self, item: ContentItem) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn set_viewer_like(&mut self, content_id: &str, liked: bool) {
        if self.items.contains_key(content_id) {
            self.liked.insert(content_id.to_string(), liked);
        }
    }

    pub fn cache_creator(&mut self, card: ProfileCard) {
        self.creators.insert(card.user_id.clone(), card);
    }

    /// Creators of current items whose profile has not been resolved yet.
    pub fn missing_creators(&self) -> Vec<String> {
        let missing: BTreeSet<&str> = self
            .items
            .values()
            .map(|item| item.creator_id.as_str())
            .filter(|creator| !self.creators.contains_key(*creator))
            .collect();
        missing.into_iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries ordered newest first, ties broken by id.
    pub fn project(&self) -> Vec<FeedEntry> {
        let mut entries: Vec<FeedEntry> = self
            .items
            .values()
            .map(|item| FeedEntry {
                id: item.id.clone(),
                creator: self
                    .creators
                    .get(&item.creator_id)
                    .cloned()
                    .unwrap_or_else(|| ProfileCard::placeholder(&item.creator_id, &self.placeholder_name)),
                title: item.title.clone(),
                caption: item.description.clone(),
                photo_url: item.photo_url.clone(),
                path: item.path.clone(),
                likes: item.likes_count,
                comments: item.comments_count,
                viewer_has_liked: self.liked.get(&item.id).copied().unwrap_or(false),
                created_at: item.created_at,
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }
}
