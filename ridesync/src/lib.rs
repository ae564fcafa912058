//! Realtime social feed and interaction-state sync for a route-sharing network.
//!
//! Every component is built on a [`store::DocumentStore`]: the relationship
//! ledger, the like/comment counter engine, the live feed projector and the
//! friends/conversation summarizer. [`client::Client`] bundles them for the
//! signed-in user.

pub mod auth;
pub mod client;
pub mod config;
pub mod content;
pub mod conversations;
pub mod counters;
pub mod errors;
pub mod feed;
pub mod id;
pub mod keys;
pub mod ledger;
pub mod notify;
pub mod optimistic;
pub mod profiles;
pub mod store;
pub mod types;
pub mod validators;

pub use auth::{AuthProvider, StaticAuth};
pub use client::Client;
pub use config::Settings;
pub use content::{NewRoute, RouteCatalog};
pub use conversations::{ConversationLog, ConversationSubscription, ConversationSummarizer, FriendSummary, FriendsOverview};
pub use counters::{CounterEngine, LikeOutcome};
pub use errors::{SyncError, ValidationError, ValidationIssue, ValidationResult};
pub use feed::{FeedEntry, FeedProjector, FeedSubscription};
pub use id::{conversation_id, generate_document_id};
pub use ledger::{AcceptedFriends, RelationshipLedger, RelationshipState};
pub use notify::{Inbox, NoopNotifier, NotificationEvent, NotificationPort, StoreNotifier};
pub use optimistic::{LocalAction, OptimisticFeed, ServerEvent, Ticket};
pub use profiles::{ProfileCard, ProfileDirectory};
pub use store::{DocRef, Document, DocumentStore, MemoryStore, Query, RedisStore, Subscription, WritePlan};
