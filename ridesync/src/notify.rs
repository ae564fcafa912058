//! Notification side effects.
//!
//! Engines emit [`NotificationEvent`]s through a [`NotificationPort`] after their
//! primary write commits. A failing port is logged and otherwise ignored.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::errors::SyncError;
use crate::id::generate_document_id;
use crate::store::{DocRef, DocumentStore, Filter, Query, SortOrder, WritePlan, server_timestamp};
use crate::types::{Notification, NotificationKind, Record, UserProfile, decode, encode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub content_id: Option<String>,
}

impl NotificationEvent {
    pub fn is_self_action(&self) -> bool {
        self.recipient_id == self.actor_id
    }
}

/// Delivery port for notification events.
#[allow(async_fn_in_trait)]
pub trait NotificationPort {
    async fn emit(&self, event: NotificationEvent) -> Result<(), SyncError>;
}

/// Port that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationPort for NoopNotifier {
    async fn emit(&self, _event: NotificationEvent) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Emits an event and logs, rather than propagates, a delivery failure.
pub(crate) async fn emit_best_effort<N: NotificationPort>(notifier: &N, event: NotificationEvent) {
    if event.is_self_action() {
        return;
    }
    let kind = event.kind;
    if let Err(err) = notifier.emit(event).await {
        log::warn!("failed to deliver {kind:?} notification: {err}");
    }
}

/// Persists notifications into the recipient's inbox collection.
pub struct StoreNotifier<S> {
    store: Arc<S>,
    placeholder_name: String,
}

impl<S: DocumentStore> StoreNotifier<S> {
    pub fn new(store: Arc<S>, placeholder_name: impl Into<String>) -> Self {
        Self {
            store,
            placeholder_name: placeholder_name.into(),
        }
    }

    async fn actor_name(&self, actor_id: &str) -> String {
        match self.store.get(&DocRef::of::<UserProfile>(actor_id)).await {
            Ok(Some(doc)) => match decode::<UserProfile>(&doc) {
                Ok(profile) => profile.display_name,
                Err(_) => self.placeholder_name.clone(),
            },
            _ => self.placeholder_name.clone(),
        }
    }
}

pub fn notification_message(kind: NotificationKind, actor_name: &str) -> String {
    match kind {
        NotificationKind::Like => format!("{actor_name} liked your route."),
        NotificationKind::Comment => format!("{actor_name} commented on your route."),
        NotificationKind::FriendRequest => format!("{actor_name} sent you a friend request."),
    }
}

impl<S: DocumentStore> NotificationPort for StoreNotifier<S> {
    async fn emit(&self, event: NotificationEvent) -> Result<(), SyncError> {
        if event.is_self_action() {
            return Ok(());
        }
        let name = self.actor_name(&event.actor_id).await;
        let notification = Notification {
            id: generate_document_id(),
            message: notification_message(event.kind, &name),
            recipient_id: event.recipient_id,
            kind: event.kind,
            actor_id: event.actor_id,
            content_id: event.content_id,
            read: false,
            created_at: Utc::now(),
        };
        let mut fields = encode(&notification)?;
        fields.insert("created_at".into(), server_timestamp());
        self.store
            .commit(WritePlan::new().create(DocRef::of::<Notification>(&notification.id), fields))
            .await
    }
}

/// Read side of a user's notifications.
pub struct Inbox<S> {
    store: Arc<S>,
}

impl<S: DocumentStore> Inbox<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn unread_query(user_id: &str) -> Query {
        Query::new(Notification::COLLECTION)
            .filter(Filter::eq("recipient_id", user_id))
            .filter(Filter::eq("read", false))
            .order_by("created_at", SortOrder::Desc)
    }

    /// Unread notifications, newest first.
    pub async fn list_unread(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>, SyncError> {
        let docs = self.store.query(&Self::unread_query(user_id).limit(limit)).await?;
        docs.iter().map(decode::<Notification>).collect()
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<usize, SyncError> {
        Ok(self.store.query(&Self::unread_query(user_id)).await?.len())
    }

    /// Marks notifications read in one atomic write. Returns how many were marked.
    pub async fn mark_read(&self, notification_ids: &[String]) -> Result<usize, SyncError> {
        let plan = notification_ids.iter().fold(WritePlan::new(), |plan, id| {
            let mut fields = serde_json::Map::new();
            fields.insert("read".into(), json!(true));
            plan.update(DocRef::of::<Notification>(id), fields)
        });
        let marked = plan.ops.len();
        self.store.commit(plan).await?;
        Ok(marked)
    }
}
