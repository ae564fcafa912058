//! Friend-request and friendship state machine.
//!
//! ```text
//! absent --send--> pending(initiator) --accept(recipient)--> accepted
//!                  pending --reject(either participant)--> absent
//! ```
//!
//! Nothing leaves `accepted`. With canonical edge ids (the default) the edge is
//! keyed by the sorted user pair and created inside a transaction, so two
//! mirrored requests racing each other cannot both succeed.

use std::sync::Arc;

use serde_json::json;

use crate::config::LedgerSettings;
use crate::errors::SyncError;
use crate::id::{canonical_edge_id, generate_document_id};
use crate::notify::{NotificationEvent, NotificationPort, emit_best_effort};
use crate::store::{DocRef, DocumentStore, Fields, Filter, Query, SortOrder, WritePlan, server_timestamp};
use crate::types::{EdgeState, NotificationKind, Record, RelationshipEdge, decode, encode};
use crate::validators::check_identifier;

/// Relationship between two users as seen from either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipState {
    None,
    Pending { initiator: String },
    Accepted,
}

impl From<&RelationshipEdge> for RelationshipState {
    fn from(edge: &RelationshipEdge) -> Self {
        match edge.state {
            EdgeState::Pending => RelationshipState::Pending {
                initiator: edge.initiator.clone(),
            },
            EdgeState::Accepted => RelationshipState::Accepted,
        }
    }
}

/// Counterpart ids of a user's accepted friendships.
///
/// Iterating consumes the snapshot taken when the list was fetched; `restart`
/// walks it again, and asking the ledger anew picks up later changes.
#[derive(Debug, Clone, Default)]
pub struct AcceptedFriends {
    ids: Vec<String>,
    cursor: usize,
}

impl AcceptedFriends {
    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.ids.iter().any(|id| id == user_id)
    }
}

impl Iterator for AcceptedFriends {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let id = self.ids.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(id)
    }
}

/// Every edge the user participates in, whatever its state.
pub fn edges_query(user_id: &str) -> Query {
    Query::new(RelationshipEdge::COLLECTION).filter(Filter::array_contains("participants", user_id))
}

/// Accepted friendships of the user.
pub fn accepted_query(user_id: &str) -> Query {
    edges_query(user_id).filter(Filter::eq("state", EdgeState::Accepted.as_str()))
}

/// Pending requests the user has received and not yet answered.
pub fn pending_incoming_query(user_id: &str) -> Query {
    Query::new(RelationshipEdge::COLLECTION)
        .filter(Filter::eq("user_b", user_id))
        .filter(Filter::eq("state", EdgeState::Pending.as_str()))
        .order_by("created_at", SortOrder::Asc)
}

/// Queries the counterparts of the user's accepted friendships.
pub async fn accepted_counterparts<S: DocumentStore>(store: &S, user_id: &str) -> Result<AcceptedFriends, SyncError> {
    let mut ids = Vec::new();
    for doc in store.query(&accepted_query(user_id)).await? {
        let edge = decode::<RelationshipEdge>(&doc)?;
        ids.push(edge.counterpart(user_id).to_string());
    }
    Ok(AcceptedFriends { ids, cursor: 0 })
}

pub struct RelationshipLedger<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    canonical_ids: bool,
}

impl<S, N> RelationshipLedger<S, N>
where
    S: DocumentStore,
    N: NotificationPort,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, settings: &LedgerSettings) -> Self {
        Self {
            store,
            notifier,
            canonical_ids: settings.canonical_edge_ids,
        }
    }

    fn directed_query(from: &str, to: &str) -> Query {
        Query::new(RelationshipEdge::COLLECTION)
            .filter(Filter::eq("user_a", from))
            .filter(Filter::eq("user_b", to))
            .limit(1)
    }

    /// The edge between two users, looked up in both directions.
    pub async fn find_edge(&self, a: &str, b: &str) -> Result<Option<RelationshipEdge>, SyncError> {
        for query in [Self::directed_query(a, b), Self::directed_query(b, a)] {
            if let Some(doc) = self.store.query(&query).await?.first() {
                return decode::<RelationshipEdge>(doc).map(Some);
            }
        }
        Ok(None)
    }

    pub async fn send_request(&self, initiator: &str, recipient: &str) -> Result<RelationshipEdge, SyncError> {
        check_identifier("initiator", initiator)?;
        check_identifier("recipient", recipient)?;
        if initiator == recipient {
            return Err(SyncError::invalid_state("cannot send a friend request to yourself"));
        }
        if let Some(existing) = self.find_edge(initiator, recipient).await? {
            return Err(SyncError::AlreadyExists {
                collection: RelationshipEdge::COLLECTION.to_string(),
                id: existing.id,
            });
        }

        let edge_id = if self.canonical_ids {
            canonical_edge_id(initiator, recipient)
        } else {
            generate_document_id()
        };
        let reference = DocRef::of::<RelationshipEdge>(&edge_id);
        let mut fields = encode(&RelationshipEdge {
            id: edge_id.clone(),
            user_a: initiator.to_string(),
            user_b: recipient.to_string(),
            participants: vec![initiator.to_string(), recipient.to_string()],
            initiator: initiator.to_string(),
            state: EdgeState::Pending,
            created_at: chrono::Utc::now(),
        })?;
        fields.insert("created_at".into(), server_timestamp());

        if self.canonical_ids {
            self.store
                .run_transaction(std::slice::from_ref(&reference), |reads| {
                    if reads.exists(&reference) {
                        return Err(SyncError::AlreadyExists {
                            collection: RelationshipEdge::COLLECTION.to_string(),
                            id: edge_id.clone(),
                        });
                    }
                    Ok((WritePlan::new().create(reference.clone(), fields.clone()), ()))
                })
                .await?;
        } else {
            self.store
                .commit(WritePlan::new().create(reference.clone(), fields))
                .await?;
        }
        log::debug!("friend request {edge_id} sent by {initiator} to {recipient}");

        emit_best_effort(
            self.notifier.as_ref(),
            NotificationEvent {
                recipient_id: recipient.to_string(),
                actor_id: initiator.to_string(),
                kind: NotificationKind::FriendRequest,
                content_id: None,
            },
        )
        .await;

        decode(&self.store.get_or_error(&reference).await?)
    }

    /// Accepts a pending request. Only the recipient may accept.
    pub async fn accept_request(&self, edge_id: &str, acting_user: &str) -> Result<RelationshipEdge, SyncError> {
        let reference = DocRef::of::<RelationshipEdge>(edge_id);
        self.store
            .run_transaction(std::slice::from_ref(&reference), |reads| {
                let mut edge = reads
                    .decode::<RelationshipEdge>(&reference)?
                    .ok_or_else(|| SyncError::not_found(RelationshipEdge::COLLECTION, edge_id))?;
                if !edge.involves(acting_user) {
                    return Err(SyncError::unauthorized(acting_user, "accept a request they are not part of"));
                }
                if edge.state == EdgeState::Accepted {
                    return Ok((WritePlan::new(), edge));
                }
                if edge.initiator == acting_user {
                    return Err(SyncError::unauthorized(acting_user, "accept their own friend request"));
                }
                let mut fields = Fields::new();
                fields.insert("state".into(), json!(EdgeState::Accepted.as_str()));
                edge.state = EdgeState::Accepted;
                Ok((WritePlan::new().update(reference.clone(), fields), edge))
            })
            .await
    }

    /// Deletes a pending request. Either participant may reject.
    pub async fn reject_request(&self, edge_id: &str, acting_user: &str) -> Result<(), SyncError> {
        let reference = DocRef::of::<RelationshipEdge>(edge_id);
        self.store
            .run_transaction(std::slice::from_ref(&reference), |reads| {
                let edge = reads
                    .decode::<RelationshipEdge>(&reference)?
                    .ok_or_else(|| SyncError::not_found(RelationshipEdge::COLLECTION, edge_id))?;
                if !edge.involves(acting_user) {
                    return Err(SyncError::unauthorized(acting_user, "reject a request they are not part of"));
                }
                if edge.state == EdgeState::Accepted {
                    return Err(SyncError::invalid_state("friendship is already accepted"));
                }
                Ok((WritePlan::new().delete(reference.clone()), ()))
            })
            .await?;
        log::debug!("friend request {edge_id} rejected by {acting_user}");
        Ok(())
    }

    pub async fn get_state(&self, a: &str, b: &str) -> Result<RelationshipState, SyncError> {
        Ok(self
            .find_edge(a, b)
            .await?
            .map_or(RelationshipState::None, |edge| RelationshipState::from(&edge)))
    }

    pub async fn list_accepted(&self, user_id: &str) -> Result<AcceptedFriends, SyncError> {
        accepted_counterparts(self.store.as_ref(), user_id).await
    }

    pub async fn list_pending_incoming(&self, user_id: &str) -> Result<Vec<RelationshipEdge>, SyncError> {
        self.store
            .query(&pending_incoming_query(user_id))
            .await?
            .iter()
            .map(decode::<RelationshipEdge>)
            .collect()
    }
}
