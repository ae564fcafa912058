//! Live, recency-ordered feed of route posts for one viewer.
//!
//! A [`FeedSubscription`] merges three sources into [`FeedEntry`] rows:
//! the content query, one like-marker document watch per item in the feed,
//! and creator profiles, looked up until they resolve.

mod state;

use std::sync::Arc;

use tokio_stream::{StreamExt, StreamMap};

use crate::config::FeedSettings;
use crate::errors::SyncError;
use crate::id::like_marker_id;
use crate::profiles::ProfileDirectory;
use crate::store::{DocRef, Document, DocumentStore, Query, SortOrder, Subscription};
use crate::types::{ContentItem, LikeMarker, Record, decode};

pub use state::{FeedDiff, FeedEntry, FeedState};

pub struct FeedProjector<S> {
    store: Arc<S>,
    limit: usize,
    placeholder_name: String,
}

impl<S: DocumentStore> FeedProjector<S> {
    pub fn new(store: Arc<S>, settings: &FeedSettings) -> Self {
        Self {
            store,
            limit: settings.limit,
            placeholder_name: settings.placeholder_name.clone(),
        }
    }

    pub fn content_query(&self) -> Query {
        Query::new(ContentItem::COLLECTION)
            .order_by("created_at", SortOrder::Desc)
            .limit(self.limit)
    }

    /// Opens the viewer's live feed. The first `next()` yields the current feed.
    pub async fn subscribe(&self, viewer_id: &str) -> Result<FeedSubscription<S>, SyncError> {
        let content = self.store.watch_query(&self.content_query()).await?;
        log::debug!("feed subscription opened for {viewer_id}");
        Ok(FeedSubscription {
            store: Arc::clone(&self.store),
            profiles: ProfileDirectory::new(Arc::clone(&self.store), self.placeholder_name.clone()),
            viewer_id: viewer_id.to_string(),
            content: Some(content),
            markers: StreamMap::new(),
            state: FeedState::new(self.placeholder_name.clone()),
            stalled: None,
        })
    }
}

enum FeedEvent {
    Content(Option<Vec<Document>>),
    Marker(String, Option<Document>),
}

/// Live feed of one viewer. Dropping it releases every underlying listener.
pub struct FeedSubscription<S> {
    store: Arc<S>,
    profiles: ProfileDirectory<S>,
    viewer_id: String,
    content: Option<Subscription<Vec<Document>>>,
    markers: StreamMap<String, Subscription<Option<Document>>>,
    state: FeedState,
    stalled: Option<Vec<Document>>,
}

impl<S: DocumentStore> FeedSubscription<S> {
    /// Waits for the next change and returns the re-projected feed.
    ///
    /// Returns `Ok(None)` once the content stream has ended. A snapshot that
    /// failed with a retryable error is applied again by the following call.
    pub async fn next(&mut self) -> Result<Option<Vec<FeedEntry>>, SyncError> {
        if let Some(docs) = self.stalled.take() {
            self.apply_snapshot(docs).await?;
            self.catch_up().await?;
            return Ok(Some(self.state.project()));
        }
        let event = {
            let Some(content) = self.content.as_mut() else {
                return Ok(None);
            };
            let markers = &mut self.markers;
            let watching_markers = !markers.is_empty();
            tokio::select! {
                snapshot = content.next() => FeedEvent::Content(snapshot),
                Some((content_id, marker)) = markers.next(), if watching_markers => FeedEvent::Marker(content_id, marker),
            }
        };

        match event {
            FeedEvent::Content(None) => {
                self.release();
                return Ok(None);
            }
            FeedEvent::Content(Some(docs)) => self.apply_snapshot(docs).await?,
            FeedEvent::Marker(content_id, marker) => self.state.set_viewer_like(&content_id, marker.is_some()),
        }
        self.catch_up().await?;
        Ok(Some(self.state.project()))
    }

    /// The latest projection without waiting.
    pub fn current(&self) -> Vec<FeedEntry> {
        self.state.project()
    }

    /// Number of per-item like-marker watches currently open.
    pub fn marker_watch_count(&self) -> usize {
        self.markers.len()
    }

    /// Releases the content subscription and every marker subscription.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(content) = self.content.take() {
            content.dispose();
        }
        let ids: Vec<String> = self.markers.keys().cloned().collect();
        for id in ids {
            if let Some(subscription) = self.markers.remove(&id) {
                subscription.dispose();
            }
        }
        log::debug!("feed subscription for {} released", self.viewer_id);
    }

    /// Folds in snapshots that are already queued, so one commit yields one projection.
    async fn catch_up(&mut self) -> Result<(), SyncError> {
        let mut latest = None;
        if let Some(content) = self.content.as_mut() {
            while let Some(docs) = content.try_next() {
                latest = Some(docs);
            }
        }
        if let Some(docs) = latest {
            self.apply_snapshot(docs).await?;
        }
        for (content_id, subscription) in self.markers.iter_mut() {
            let mut marker = None;
            while let Some(doc) = subscription.try_next() {
                marker = Some(doc);
            }
            if let Some(doc) = marker {
                self.state.set_viewer_like(content_id, doc.is_some());
            }
        }
        Ok(())
    }

    /// Applies a content snapshot, keeping it for the next call when the store was unreachable.
    async fn apply_snapshot(&mut self, docs: Vec<Document>) -> Result<(), SyncError> {
        if let Err(err) = self.apply_content(&docs).await {
            if err.is_retryable() {
                log::debug!("feed snapshot for {} deferred: {err}", self.viewer_id);
                self.stalled = Some(docs);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Folds a content snapshot into the state. The state is left untouched on error.
    async fn apply_content(&mut self, docs: &[Document]) -> Result<(), SyncError> {
        let items = docs.iter().map(decode::<ContentItem>).collect::<Result<Vec<_>, _>>()?;

        let mut opened = Vec::new();
        for content_id in self.state.entering(&items) {
            let marker = DocRef::of::<LikeMarker>(like_marker_id(&content_id, &self.viewer_id));
            let subscription = self.store.watch_document(&marker).await?;
            opened.push((content_id, subscription));
        }

        let diff = self.state.replace_items(items);
        for content_id in diff.left {
            if let Some(subscription) = self.markers.remove(&content_id) {
                subscription.dispose();
            }
        }
        for (content_id, mut subscription) in opened {
            if let Some(current) = subscription.try_next() {
                self.state.set_viewer_like(&content_id, current.is_some());
            }
            self.markers.insert(content_id, subscription);
        }

        // Unresolved creators stay uncached and are looked up again on the next snapshot.
        for creator_id in self.state.missing_creators() {
            if let Some(card) = self.profiles.resolve_card(&creator_id).await {
                self.state.cache_creator(card);
            }
        }
        Ok(())
    }
}
