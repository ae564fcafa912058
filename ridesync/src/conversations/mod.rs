//! Friends list with last-message previews and the pending-request badge.
//!
//! A [`ConversationSubscription`] listens to the viewer's edges, to the
//! pending requests addressed to the viewer, and to one conversation document
//! per accepted friend. Friends that leave the list have their conversation
//! watch disposed.

mod messages;
mod summary;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_stream::{StreamExt, StreamMap};

use crate::config::ConversationSettings;
use crate::errors::SyncError;
use crate::id::conversation_id;
use crate::ledger::{accepted_counterparts, edges_query, pending_incoming_query};
use crate::profiles::{ProfileCard, ProfileDirectory};
use crate::store::{DocRef, Document, DocumentStore, Subscription};
use crate::types::{Conversation, decode};

pub use messages::ConversationLog;
pub use summary::{FriendSummary, FriendsOverview, SummaryFormatter, sort_friends};

pub struct ConversationSummarizer<S> {
    store: Arc<S>,
    formatter: SummaryFormatter,
    placeholder_name: String,
}

impl<S: DocumentStore> ConversationSummarizer<S> {
    pub fn new(store: Arc<S>, settings: &ConversationSettings, placeholder_name: impl Into<String>) -> Self {
        Self {
            store,
            formatter: SummaryFormatter::from_settings(settings),
            placeholder_name: placeholder_name.into(),
        }
    }

    /// Opens the viewer's live friends overview. The first `next()` yields the current state.
    pub async fn subscribe(&self, viewer_id: &str) -> Result<ConversationSubscription<S>, SyncError> {
        let edges = self.store.watch_query(&edges_query(viewer_id)).await?;
        let pending = self.store.watch_query(&pending_incoming_query(viewer_id)).await?;
        log::debug!("conversation subscription opened for {viewer_id}");
        Ok(ConversationSubscription {
            store: Arc::clone(&self.store),
            profiles: ProfileDirectory::new(Arc::clone(&self.store), self.placeholder_name.clone()),
            formatter: self.formatter.clone(),
            placeholder_name: self.placeholder_name.clone(),
            viewer_id: viewer_id.to_string(),
            edges: Some(edges),
            pending: Some(pending),
            chats: StreamMap::new(),
            friends: Vec::new(),
            cards: HashMap::new(),
            conversations: HashMap::new(),
            pending_requests: 0,
            primed: false,
        })
    }
}

enum OverviewEvent {
    Edges(Option<Vec<Document>>),
    Pending(Option<Vec<Document>>),
    Chat(String, Option<Document>),
}

/// Live friends overview of one viewer. Dropping it releases every listener.
pub struct ConversationSubscription<S> {
    store: Arc<S>,
    profiles: ProfileDirectory<S>,
    formatter: SummaryFormatter,
    placeholder_name: String,
    viewer_id: String,
    edges: Option<Subscription<Vec<Document>>>,
    pending: Option<Subscription<Vec<Document>>>,
    chats: StreamMap<String, Subscription<Option<Document>>>,
    friends: Vec<String>,
    cards: HashMap<String, ProfileCard>,
    conversations: HashMap<String, Conversation>,
    pending_requests: usize,
    primed: bool,
}

impl<S: DocumentStore> ConversationSubscription<S> {
    /// Waits for the next change and returns the re-derived overview.
    ///
    /// Returns `Ok(None)` once either relationship stream has ended.
    pub async fn next(&mut self) -> Result<Option<FriendsOverview>, SyncError> {
        if !self.primed {
            self.primed = true;
            if self.prime().await? {
                return Ok(Some(self.overview()));
            }
        }
        let event = {
            let (Some(edges), Some(pending)) = (self.edges.as_mut(), self.pending.as_mut()) else {
                return Ok(None);
            };
            let chats = &mut self.chats;
            let watching_chats = !chats.is_empty();
            tokio::select! {
                snapshot = edges.next() => OverviewEvent::Edges(snapshot),
                snapshot = pending.next() => OverviewEvent::Pending(snapshot),
                Some((friend_id, doc)) = chats.next(), if watching_chats => OverviewEvent::Chat(friend_id, doc),
            }
        };

        match event {
            OverviewEvent::Edges(None) | OverviewEvent::Pending(None) => {
                self.release();
                return Ok(None);
            }
            OverviewEvent::Edges(Some(_)) => self.refresh_friends().await?,
            OverviewEvent::Pending(Some(docs)) => self.pending_requests = docs.len(),
            OverviewEvent::Chat(friend_id, doc) => self.apply_conversation(&friend_id, doc)?,
        }
        self.resolve_cards().await;
        Ok(Some(self.overview()))
    }

    /// The latest overview without waiting.
    pub fn overview(&self) -> FriendsOverview {
        let mut friends: Vec<FriendSummary> = self
            .friends
            .iter()
            .map(|friend_id| {
                let card = self
                    .cards
                    .get(friend_id)
                    .cloned()
                    .unwrap_or_else(|| ProfileCard::placeholder(friend_id, &self.placeholder_name));
                self.formatter
                    .summarize(&self.viewer_id, card, self.conversations.get(friend_id))
            })
            .collect();
        sort_friends(&mut friends);
        FriendsOverview {
            friends,
            pending_requests: self.pending_requests,
        }
    }

    /// Number of per-friend conversation watches currently open.
    pub fn conversation_watch_count(&self) -> usize {
        self.chats.len()
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(edges) = self.edges.take() {
            edges.dispose();
        }
        if let Some(pending) = self.pending.take() {
            pending.dispose();
        }
        let ids: Vec<String> = self.chats.keys().cloned().collect();
        for id in ids {
            if let Some(subscription) = self.chats.remove(&id) {
                subscription.dispose();
            }
        }
        log::debug!("conversation subscription for {} released", self.viewer_id);
    }

    /// Folds the initial snapshots of both relationship streams at once.
    async fn prime(&mut self) -> Result<bool, SyncError> {
        let initial_pending = self.pending.as_mut().and_then(Subscription::try_next);
        let initial_edges = self.edges.as_mut().and_then(Subscription::try_next);
        let primed = initial_pending.is_some() || initial_edges.is_some();
        if let Some(docs) = initial_pending {
            self.pending_requests = docs.len();
        }
        if initial_edges.is_some() {
            self.refresh_friends().await?;
        }
        self.resolve_cards().await;
        Ok(primed)
    }

    /// Re-queries accepted friends and reconciles the per-friend watches.
    async fn refresh_friends(&mut self) -> Result<(), SyncError> {
        let accepted: Vec<String> = accepted_counterparts(self.store.as_ref(), &self.viewer_id)
            .await?
            .collect();

        let left: Vec<String> = self
            .friends
            .iter()
            .filter(|id| !accepted.contains(id))
            .cloned()
            .collect();
        for friend_id in &left {
            if let Some(subscription) = self.chats.remove(friend_id) {
                subscription.dispose();
            }
            self.conversations.remove(friend_id);
        }

        for friend_id in &accepted {
            if self.friends.contains(friend_id) {
                continue;
            }
            let reference = DocRef::of::<Conversation>(conversation_id(&self.viewer_id, friend_id));
            let mut subscription = self.store.watch_document(&reference).await?;
            if let Some(current) = subscription.try_next() {
                self.apply_conversation(friend_id, current)?;
            }
            self.chats.insert(friend_id.clone(), subscription);
        }

        self.friends = accepted;
        Ok(())
    }

    /// Looks up friends whose profile card is not known yet. Misses are retried on the next event.
    async fn resolve_cards(&mut self) {
        let unresolved: Vec<String> = self
            .friends
            .iter()
            .filter(|id| !self.cards.contains_key(*id))
            .cloned()
            .collect();
        for friend_id in unresolved {
            if let Some(card) = self.profiles.resolve_card(&friend_id).await {
                self.cards.insert(friend_id, card);
            }
        }
    }

    fn apply_conversation(&mut self, friend_id: &str, doc: Option<Document>) -> Result<(), SyncError> {
        match doc {
            Some(doc) => {
                let conversation = decode::<Conversation>(&doc)?;
                self.conversations.insert(friend_id.to_string(), conversation);
            }
            None => {
                self.conversations.remove(friend_id);
            }
        }
        Ok(())
    }
}
