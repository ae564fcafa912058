//! Record types stored in the document store, and the decode boundary.
//!
//! Documents are loosely shaped JSON at rest. Every read passes through
//! [`decode`], which turns the document into a tagged record or fails with
//! `MalformedDocument`, so missing or mistyped fields never travel further.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SyncError;
use crate::store::{Document, Fields};

/// A record type persisted in one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn record_id(&self) -> &str;
}

/// Decodes a document into its record, taking the id from the document address.
pub fn decode<T: Record>(doc: &Document) -> Result<T, SyncError> {
    let mut fields = doc.fields.clone();
    fields.insert("id".to_string(), Value::String(doc.reference.id.clone()));
    serde_json::from_value(Value::Object(fields)).map_err(|err| SyncError::MalformedDocument {
        collection: doc.reference.collection.clone(),
        id: doc.reference.id.clone(),
        reason: err.to_string(),
    })
}

/// Encodes a record into top-level fields. The id lives in the document address.
pub fn encode<T: Record>(record: &T) -> Result<Fields, SyncError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut fields)) => {
            fields.remove("id");
            Ok(fields)
        }
        Ok(_) => Err(SyncError::Other {
            message: format!("{} record did not encode to an object", T::COLLECTION).into(),
        }),
        Err(err) => Err(SyncError::Other {
            message: format!("failed to encode {} record: {err}", T::COLLECTION).into(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motorcycle {
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub year: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    /// Lower-cased display name, the prefix-search key.
    #[serde(default)]
    pub display_name_lower: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub motorcycle: Option<Motorcycle>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            id: id.into(),
            display_name_lower: display_name.to_lowercase(),
            display_name,
            avatar_url: None,
            city: None,
            birth_date: None,
            motorcycle: None,
            bio: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_motorcycle(mut self, motorcycle: Motorcycle) -> Self {
        self.motorcycle = Some(motorcycle);
        self
    }
}

impl Record for UserProfile {
    const COLLECTION: &'static str = "users";

    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    Pending,
    Accepted,
}

impl EdgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeState::Pending => "pending",
            EdgeState::Accepted => "accepted",
        }
    }
}

/// Friend request or friendship between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub id: String,
    /// Initiating user.
    pub user_a: String,
    /// Receiving user.
    pub user_b: String,
    /// `[user_a, user_b]`, for array-contains queries.
    pub participants: Vec<String>,
    pub initiator: String,
    pub state: EdgeState,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl RelationshipEdge {
    pub fn involves(&self, user: &str) -> bool {
        self.user_a == user || self.user_b == user
    }

    /// The participant that is not `user`.
    pub fn counterpart(&self, user: &str) -> &str {
        if self.user_a == user { &self.user_b } else { &self.user_a }
    }

    pub fn recipient(&self) -> &str {
        self.counterpart(&self.initiator)
    }
}

impl Record for RelationshipEdge {
    const COLLECTION: &'static str = "friendships";

    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A shared route post with denormalized engagement counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub path: Vec<GeoPoint>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub comments_count: u64,
}

impl Record for ContentItem {
    const COLLECTION: &'static str = "routes";

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Presence-only marker of one user's like on one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeMarker {
    pub id: String,
    pub content_id: String,
    pub user_id: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl Record for LikeMarker {
    const COLLECTION: &'static str = "likes";

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Author details frozen at the time a comment is posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content_id: String,
    pub author: AuthorSnapshot,
    pub text: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl Record for Comment {
    const COLLECTION: &'static str = "comments";

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Last-message summary of the conversation between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sender_id: Option<String>,
    /// Participants who have not read the last message.
    #[serde(default)]
    pub unread_by: BTreeSet<String>,
}

impl Record for Conversation {
    const COLLECTION: &'static str = "chats";

    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    FriendRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub actor_id: String,
    #[serde(default)]
    pub content_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl Record for Notification {
    const COLLECTION: &'static str = "notifications";

    fn record_id(&self) -> &str {
        &self.id
    }
}
