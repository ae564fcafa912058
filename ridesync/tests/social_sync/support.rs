use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use ridesync::config::Settings;
use ridesync::errors::SyncError;
use ridesync::feed::FeedEntry;
use ridesync::store::Fields;
use ridesync::types::{ContentItem, RelationshipEdge, UserProfile, decode, encode};
use ridesync::{
    ConversationLog, ConversationSubscription, ConversationSummarizer, CounterEngine, DocRef, DocumentStore,
    FeedProjector, FeedSubscription, FriendsOverview, MemoryStore, NewRoute, NotificationEvent, NotificationPort,
    ProfileDirectory, RelationshipLedger, RouteCatalog,
};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

/// Notifier that keeps every delivered event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl NotificationPort for RecordingNotifier {
    async fn emit(&self, event: NotificationEvent) -> Result<(), SyncError> {
        self.events.lock().expect("events lock").push(event);
        Ok(())
    }
}

/// Notifier whose delivery always fails.
#[derive(Default)]
pub struct FailingNotifier;

impl NotificationPort for FailingNotifier {
    async fn emit(&self, _event: NotificationEvent) -> Result<(), SyncError> {
        Err(SyncError::Unreachable {
            message: "push gateway down".into(),
        })
    }
}

pub struct Harness<N = RecordingNotifier> {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<N>,
    pub settings: Settings,
}

impl Harness<RecordingNotifier> {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::default())
    }
}

impl<N: NotificationPort> Harness<N> {
    pub fn with_notifier(notifier: N) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(notifier),
            settings: Settings::default(),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.store = Arc::new(self.store.as_ref().clone().with_max_attempts(attempts));
        self
    }

    pub fn with_random_edge_ids(mut self) -> Self {
        self.settings.ledger.canonical_edge_ids = false;
        self
    }

    pub fn ledger(&self) -> RelationshipLedger<MemoryStore, N> {
        RelationshipLedger::new(Arc::clone(&self.store), Arc::clone(&self.notifier), &self.settings.ledger)
    }

    pub fn counters(&self) -> CounterEngine<MemoryStore, N> {
        CounterEngine::new(Arc::clone(&self.store), Arc::clone(&self.notifier))
    }

    pub fn feed(&self) -> FeedProjector<MemoryStore> {
        FeedProjector::new(Arc::clone(&self.store), &self.settings.feed)
    }

    pub fn summarizer(&self) -> ConversationSummarizer<MemoryStore> {
        ConversationSummarizer::new(
            Arc::clone(&self.store),
            &self.settings.conversations,
            self.settings.feed.placeholder_name.clone(),
        )
    }

    pub fn messages(&self) -> ConversationLog<MemoryStore> {
        ConversationLog::new(Arc::clone(&self.store))
    }

    pub async fn rider(&self, id: &str, name: &str) {
        ProfileDirectory::new(Arc::clone(&self.store), "User")
            .upsert(UserProfile::new(id, name))
            .await
            .expect("seed rider");
    }

    pub async fn route(&self, creator: &str, title: &str) -> ContentItem {
        RouteCatalog::new(Arc::clone(&self.store))
            .publish(creator, NewRoute::new(title))
            .await
            .expect("publish route")
    }

    /// Writes a route document directly, with preset counters.
    pub async fn route_with_counts(&self, id: &str, creator: &str, likes: u64, comments: u64) -> ContentItem {
        let item = ContentItem {
            id: id.into(),
            creator_id: creator.into(),
            title: format!("Route {id}"),
            description: String::new(),
            photo_url: None,
            path: Vec::new(),
            created_at: Utc::now(),
            likes_count: likes,
            comments_count: comments,
        };
        let fields: Fields = encode(&item).expect("encode route");
        self.store
            .set(&DocRef::of::<ContentItem>(id), fields)
            .await
            .expect("seed route");
        item
    }

    pub async fn befriend(&self, initiator: &str, recipient: &str) -> RelationshipEdge {
        let ledger = self.ledger();
        let edge = ledger.send_request(initiator, recipient).await.expect("send request");
        ledger.accept_request(&edge.id, recipient).await.expect("accept request")
    }

    pub async fn content(&self, id: &str) -> ContentItem {
        let doc = self
            .store
            .get_or_error(&DocRef::of::<ContentItem>(id))
            .await
            .expect("read route");
        decode(&doc).expect("decode route")
    }

    pub fn count(&self, collection: &str) -> usize {
        self.store.collection_len(collection)
    }
}

/// Pulls projections until one satisfies `done`.
pub async fn feed_until<F>(feed: &mut FeedSubscription<MemoryStore>, mut done: F) -> Vec<FeedEntry>
where
    F: FnMut(&[FeedEntry]) -> bool,
{
    loop {
        let entries = tokio::time::timeout(SNAPSHOT_TIMEOUT, feed.next())
            .await
            .expect("feed snapshot in time")
            .expect("feed snapshot")
            .expect("feed still open");
        if done(&entries) {
            return entries;
        }
    }
}

/// Pulls overviews until one satisfies `done`.
pub async fn overview_until<F>(friends: &mut ConversationSubscription<MemoryStore>, mut done: F) -> FriendsOverview
where
    F: FnMut(&FriendsOverview) -> bool,
{
    loop {
        let overview = tokio::time::timeout(SNAPSHOT_TIMEOUT, friends.next())
            .await
            .expect("overview in time")
            .expect("overview")
            .expect("overview still open");
        if done(&overview) {
            return overview;
        }
    }
}
