//! Like toggles and comment appends with denormalized counters.
//!
//! The marker (or comment) and the counter on the content item are written in
//! one transaction, so at rest `likes_count` always equals the number of like
//! markers and `comments_count` the number of comments.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::errors::{SyncError, ValidationError};
use crate::id::{generate_document_id, like_marker_id};
use crate::notify::{NotificationEvent, NotificationPort, emit_best_effort};
use crate::store::{DocRef, DocumentStore, Fields, Filter, Query, SortOrder, WritePlan, server_timestamp};
use crate::types::{AuthorSnapshot, Comment, ContentItem, LikeMarker, NotificationKind, Record, decode};
use crate::validators::{check_identifier, check_text};

/// Maximum comment length in characters.
pub const MAX_COMMENT_LEN: usize = 1000;

/// Result of a like toggle: whether the user now likes the item, and the new count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub count: u64,
}

pub struct CounterEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

fn counter_update(field: &str, value: u64) -> Fields {
    let mut fields = Fields::new();
    fields.insert(field.to_string(), json!(value));
    fields
}

impl<S, N> CounterEngine<S, N>
where
    S: DocumentStore,
    N: NotificationPort,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    /// Likes the item if the user has not liked it yet, otherwise removes the like.
    pub async fn toggle_like(&self, content_id: &str, user_id: &str) -> Result<LikeOutcome, SyncError> {
        check_identifier("content_id", content_id)?;
        check_identifier("user_id", user_id)?;
        let content = DocRef::of::<ContentItem>(content_id);
        let marker = DocRef::of::<LikeMarker>(like_marker_id(content_id, user_id));

        let (outcome, creator_id) = self
            .store
            .run_transaction(&[content.clone(), marker.clone()], |reads| {
                let item = reads
                    .decode::<ContentItem>(&content)?
                    .ok_or_else(|| SyncError::not_found(ContentItem::COLLECTION, content_id))?;
                let (plan, outcome) = if reads.exists(&marker) {
                    let count = item.likes_count.saturating_sub(1);
                    let plan = WritePlan::new()
                        .delete(marker.clone())
                        .update(content.clone(), counter_update("likes_count", count));
                    (plan, LikeOutcome { liked: false, count })
                } else {
                    let count = item.likes_count + 1;
                    let mut fields = Fields::new();
                    fields.insert("content_id".into(), json!(content_id));
                    fields.insert("user_id".into(), json!(user_id));
                    fields.insert("created_at".into(), server_timestamp());
                    let plan = WritePlan::new()
                        .create(marker.clone(), fields)
                        .update(content.clone(), counter_update("likes_count", count));
                    (plan, LikeOutcome { liked: true, count })
                };
                Ok((plan, (outcome, item.creator_id)))
            })
            .await?;
        log::debug!(
            "{user_id} {} {content_id} (likes: {})",
            if outcome.liked { "liked" } else { "unliked" },
            outcome.count
        );

        if outcome.liked {
            emit_best_effort(
                self.notifier.as_ref(),
                NotificationEvent {
                    recipient_id: creator_id,
                    actor_id: user_id.to_string(),
                    kind: NotificationKind::Like,
                    content_id: Some(content_id.to_string()),
                },
            )
            .await;
        }
        Ok(outcome)
    }

    /// Appends a comment and bumps `comments_count` in one transaction.
    pub async fn add_comment(&self, content_id: &str, author: &AuthorSnapshot, text: &str) -> Result<Comment, SyncError> {
        check_identifier("content_id", content_id)?;
        check_identifier("author", &author.user_id)?;
        let mut issues = Vec::new();
        check_text(&mut issues, "text", text, MAX_COMMENT_LEN);
        ValidationError::new(issues).into_result()?;

        let content = DocRef::of::<ContentItem>(content_id);
        let comment = DocRef::of::<Comment>(generate_document_id());
        let mut fields = Fields::new();
        fields.insert("content_id".into(), json!(content_id));
        fields.insert("author".into(), json!(author));
        fields.insert("text".into(), json!(text.trim()));
        fields.insert("created_at".into(), server_timestamp());

        let creator_id = self
            .store
            .run_transaction(std::slice::from_ref(&content), |reads| {
                let item = reads
                    .decode::<ContentItem>(&content)?
                    .ok_or_else(|| SyncError::not_found(ContentItem::COLLECTION, content_id))?;
                let plan = WritePlan::new()
                    .create(comment.clone(), fields.clone())
                    .update(content.clone(), counter_update("comments_count", item.comments_count + 1));
                Ok((plan, item.creator_id))
            })
            .await?;

        emit_best_effort(
            self.notifier.as_ref(),
            NotificationEvent {
                recipient_id: creator_id,
                actor_id: author.user_id.clone(),
                kind: NotificationKind::Comment,
                content_id: Some(content_id.to_string()),
            },
        )
        .await;

        decode(&self.store.get_or_error(&comment).await?)
    }

    pub async fn has_liked(&self, content_id: &str, user_id: &str) -> Result<bool, SyncError> {
        let marker = DocRef::of::<LikeMarker>(like_marker_id(content_id, user_id));
        Ok(self.store.get(&marker).await?.is_some())
    }

    /// Comments on an item, oldest first.
    pub async fn list_comments(&self, content_id: &str, limit: usize) -> Result<Vec<Comment>, SyncError> {
        let query = Query::new(Comment::COLLECTION)
            .filter(Filter::eq("content_id", content_id))
            .order_by("created_at", SortOrder::Asc)
            .limit(limit);
        self.store.query(&query).await?.iter().map(decode::<Comment>).collect()
    }
}
