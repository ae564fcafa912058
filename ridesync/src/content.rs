use std::sync::Arc;

use crate::errors::{SyncError, ValidationError, ValidationIssue};
use crate::id::generate_document_id;
use crate::store::{DocRef, DocumentStore, Filter, Query, SortOrder, WritePlan, server_timestamp};
use crate::types::{ContentItem, GeoPoint, Record, decode, encode};
use crate::validators::{check_identifier, check_optional_url, check_text};

pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Route post as submitted by its creator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRoute {
    pub title: String,
    pub description: String,
    pub photo_url: Option<String>,
    pub path: Vec<GeoPoint>,
}

impl NewRoute {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_photo(mut self, photo_url: impl Into<String>) -> Self {
        self.photo_url = Some(photo_url.into());
        self
    }

    pub fn with_path(mut self, path: Vec<GeoPoint>) -> Self {
        self.path = path;
        self
    }
}

/// Publishing and lookup of route posts.
pub struct RouteCatalog<S> {
    store: Arc<S>,
}

impl<S: DocumentStore> RouteCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn publish(&self, creator_id: &str, route: NewRoute) -> Result<ContentItem, SyncError> {
        check_identifier("creator_id", creator_id)?;
        let mut issues = Vec::new();
        check_text(&mut issues, "title", &route.title, MAX_TITLE_LEN);
        if route.description.chars().count() > MAX_DESCRIPTION_LEN {
            issues.push(ValidationIssue::new(
                "description",
                "length",
                format!("description must be at most {MAX_DESCRIPTION_LEN} characters"),
            ));
        }
        check_optional_url(&mut issues, "photo_url", route.photo_url.as_deref());
        ValidationError::new(issues).into_result()?;

        let item = ContentItem {
            id: generate_document_id(),
            creator_id: creator_id.to_string(),
            title: route.title.trim().to_string(),
            description: route.description,
            photo_url: route.photo_url,
            path: route.path,
            created_at: chrono::Utc::now(),
            likes_count: 0,
            comments_count: 0,
        };
        let reference = DocRef::of::<ContentItem>(&item.id);
        let mut fields = encode(&item)?;
        fields.insert("created_at".into(), server_timestamp());
        self.store.commit(WritePlan::new().create(reference.clone(), fields)).await?;
        log::debug!("route {} published by {creator_id}", item.id);

        decode(&self.store.get_or_error(&reference).await?)
    }

    pub async fn get(&self, content_id: &str) -> Result<Option<ContentItem>, SyncError> {
        self.store
            .get(&DocRef::of::<ContentItem>(content_id))
            .await?
            .map(|doc| decode::<ContentItem>(&doc))
            .transpose()
    }

    /// The creator's routes, newest first.
    pub async fn list_by_creator(&self, creator_id: &str) -> Result<Vec<ContentItem>, SyncError> {
        let query = Query::new(ContentItem::COLLECTION)
            .filter(Filter::eq("creator_id", creator_id))
            .order_by("created_at", SortOrder::Desc);
        self.store.query(&query).await?.iter().map(decode::<ContentItem>).collect()
    }
}
