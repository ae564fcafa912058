use std::sync::Arc;

use serde::Serialize;

use crate::errors::{SyncError, ValidationError};
use crate::store::{DocRef, DocumentStore, Filter, Query};
use crate::types::{Record, UserProfile, decode, encode};
use crate::validators::{check_identifier, check_optional_url, check_text};

/// Minimum query length before a name search hits the store.
pub const MIN_SEARCH_LEN: usize = 3;
/// Maximum number of search hits.
pub const SEARCH_LIMIT: usize = 10;

const SEARCH_UPPER_BOUND: char = '\u{f8ff}';

/// Display details of a user as shown next to content or in lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileCard {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl ProfileCard {
    pub fn placeholder(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url: String::new(),
        }
    }
}

impl From<&UserProfile> for ProfileCard {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.id.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone().unwrap_or_default(),
        }
    }
}

pub struct ProfileDirectory<S> {
    store: Arc<S>,
    placeholder_name: String,
}

impl<S: DocumentStore> ProfileDirectory<S> {
    pub fn new(store: Arc<S>, placeholder_name: impl Into<String>) -> Self {
        Self {
            store,
            placeholder_name: placeholder_name.into(),
        }
    }

    /// Creates or replaces the profile, refreshing the search key.
    pub async fn upsert(&self, mut profile: UserProfile) -> Result<UserProfile, SyncError> {
        check_identifier("id", &profile.id)?;
        let mut issues = Vec::new();
        check_text(&mut issues, "display_name", &profile.display_name, 64);
        check_optional_url(&mut issues, "avatar_url", profile.avatar_url.as_deref());
        ValidationError::new(issues).into_result()?;

        profile.display_name = profile.display_name.trim().to_string();
        profile.display_name_lower = profile.display_name.to_lowercase();
        self.store
            .set(&DocRef::of::<UserProfile>(&profile.id), encode(&profile)?)
            .await?;
        Ok(profile)
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, SyncError> {
        self.store
            .get(&DocRef::of::<UserProfile>(user_id))
            .await?
            .map(|doc| decode::<UserProfile>(&doc))
            .transpose()
    }

    /// Display card for a user, degrading to the placeholder on any failure.
    pub async fn card(&self, user_id: &str) -> ProfileCard {
        self.resolve_card(user_id)
            .await
            .unwrap_or_else(|| ProfileCard::placeholder(user_id, &self.placeholder_name))
    }

    /// Display card of a stored profile, `None` when it is missing or unreadable.
    pub async fn resolve_card(&self, user_id: &str) -> Option<ProfileCard> {
        match self.get(user_id).await {
            Ok(profile) => profile.as_ref().map(ProfileCard::from),
            Err(err) => {
                log::debug!("profile {user_id} unavailable: {err}");
                None
            }
        }
    }

    /// Prefix search on display names, excluding the searching user.
    pub async fn search(&self, viewer: &str, text: &str) -> Result<Vec<UserProfile>, SyncError> {
        let needle = text.trim().to_lowercase();
        if needle.chars().count() < MIN_SEARCH_LEN {
            return Ok(Vec::new());
        }
        let query = Query::new(UserProfile::COLLECTION)
            .filter(Filter::ge("display_name_lower", needle.as_str()))
            .filter(Filter::le("display_name_lower", format!("{needle}{SEARCH_UPPER_BOUND}")))
            .limit(SEARCH_LIMIT + 1);
        let docs = self.store.query(&query).await?;
        let mut found = Vec::with_capacity(docs.len());
        for doc in &docs {
            let profile = decode::<UserProfile>(doc)?;
            if profile.id != viewer {
                found.push(profile);
            }
        }
        found.truncate(SEARCH_LIMIT);
        Ok(found)
    }
}
