//! Facade bundling every component over one store for the signed-in user.

use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::Settings;
use crate::content::{NewRoute, RouteCatalog};
use crate::conversations::{ConversationLog, ConversationSubscription, ConversationSummarizer};
use crate::counters::{CounterEngine, LikeOutcome};
use crate::errors::SyncError;
use crate::feed::{FeedProjector, FeedSubscription};
use crate::ledger::{RelationshipLedger, RelationshipState};
use crate::notify::{Inbox, NotificationPort};
use crate::profiles::ProfileDirectory;
use crate::store::DocumentStore;
use crate::types::{AuthorSnapshot, Comment, ContentItem, Conversation, RelationshipEdge, UserProfile};

pub struct Client<S, A, N> {
    store: Arc<S>,
    auth: Arc<A>,
    settings: Settings,
    ledger: RelationshipLedger<S, N>,
    counters: CounterEngine<S, N>,
    feed: FeedProjector<S>,
    conversations: ConversationSummarizer<S>,
    messages: ConversationLog<S>,
    profiles: ProfileDirectory<S>,
    routes: RouteCatalog<S>,
    inbox: Inbox<S>,
}

impl<S, A, N> Client<S, A, N>
where
    S: DocumentStore,
    A: AuthProvider,
    N: NotificationPort,
{
    pub fn new(store: Arc<S>, auth: Arc<A>, notifier: Arc<N>, settings: Settings) -> Self {
        let placeholder_name = settings.feed.placeholder_name.clone();
        Self {
            ledger: RelationshipLedger::new(Arc::clone(&store), Arc::clone(&notifier), &settings.ledger),
            counters: CounterEngine::new(Arc::clone(&store), notifier),
            feed: FeedProjector::new(Arc::clone(&store), &settings.feed),
            conversations: ConversationSummarizer::new(
                Arc::clone(&store),
                &settings.conversations,
                placeholder_name.clone(),
            ),
            messages: ConversationLog::new(Arc::clone(&store)),
            profiles: ProfileDirectory::new(Arc::clone(&store), placeholder_name),
            routes: RouteCatalog::new(Arc::clone(&store)),
            inbox: Inbox::new(Arc::clone(&store)),
            store,
            auth,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &RelationshipLedger<S, N> {
        &self.ledger
    }

    pub fn counters(&self) -> &CounterEngine<S, N> {
        &self.counters
    }

    pub fn feed(&self) -> &FeedProjector<S> {
        &self.feed
    }

    pub fn conversations(&self) -> &ConversationSummarizer<S> {
        &self.conversations
    }

    pub fn messages(&self) -> &ConversationLog<S> {
        &self.messages
    }

    pub fn profiles(&self) -> &ProfileDirectory<S> {
        &self.profiles
    }

    pub fn routes(&self) -> &RouteCatalog<S> {
        &self.routes
    }

    pub fn inbox(&self) -> &Inbox<S> {
        &self.inbox
    }

    fn current_user(&self, action: &'static str) -> Result<String, SyncError> {
        self.auth.require_user(action)
    }

    pub async fn update_profile(&self, mut profile: UserProfile) -> Result<UserProfile, SyncError> {
        let user_id = self.current_user("update a profile")?;
        if profile.id.is_empty() {
            profile.id = user_id.clone();
        }
        if profile.id != user_id {
            return Err(SyncError::unauthorized(user_id, "update another user's profile"));
        }
        self.profiles.upsert(profile).await
    }

    pub async fn publish_route(&self, route: NewRoute) -> Result<ContentItem, SyncError> {
        let user_id = self.current_user("publish a route")?;
        self.routes.publish(&user_id, route).await
    }

    pub async fn toggle_like(&self, content_id: &str) -> Result<LikeOutcome, SyncError> {
        let user_id = self.current_user("like a route")?;
        self.counters.toggle_like(content_id, &user_id).await
    }

    /// Comments as the current user, snapshotting their name and avatar.
    pub async fn add_comment(&self, content_id: &str, text: &str) -> Result<Comment, SyncError> {
        let user_id = self.current_user("comment on a route")?;
        let card = self.profiles.card(&user_id).await;
        let author = AuthorSnapshot {
            user_id,
            username: card.display_name,
            avatar_url: card.avatar_url,
        };
        self.counters.add_comment(content_id, &author, text).await
    }

    pub async fn send_request(&self, recipient_id: &str) -> Result<RelationshipEdge, SyncError> {
        let user_id = self.current_user("send a friend request")?;
        self.ledger.send_request(&user_id, recipient_id).await
    }

    pub async fn accept_request(&self, edge_id: &str) -> Result<RelationshipEdge, SyncError> {
        let user_id = self.current_user("accept a friend request")?;
        self.ledger.accept_request(edge_id, &user_id).await
    }

    pub async fn reject_request(&self, edge_id: &str) -> Result<(), SyncError> {
        let user_id = self.current_user("reject a friend request")?;
        self.ledger.reject_request(edge_id, &user_id).await
    }

    pub async fn relationship_with(&self, other_id: &str) -> Result<RelationshipState, SyncError> {
        let user_id = self.current_user("view relationships")?;
        self.ledger.get_state(&user_id, other_id).await
    }

    pub async fn send_message(&self, recipient_id: &str, text: &str) -> Result<Conversation, SyncError> {
        let user_id = self.current_user("send a message")?;
        self.messages.record_message(&user_id, recipient_id, text).await
    }

    pub async fn mark_conversation_read(&self, other_id: &str) -> Result<(), SyncError> {
        let user_id = self.current_user("read a conversation")?;
        self.messages.mark_read(&user_id, other_id).await
    }

    pub async fn search_users(&self, text: &str) -> Result<Vec<UserProfile>, SyncError> {
        let user_id = self.current_user("search users")?;
        self.profiles.search(&user_id, text).await
    }

    pub async fn subscribe_feed(&self) -> Result<FeedSubscription<S>, SyncError> {
        let user_id = self.current_user("view the feed")?;
        self.feed.subscribe(&user_id).await
    }

    pub async fn subscribe_friends(&self) -> Result<ConversationSubscription<S>, SyncError> {
        let user_id = self.current_user("view friends")?;
        self.conversations.subscribe(&user_id).await
    }
}
