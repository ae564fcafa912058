use ridesync::errors::SyncError;
use ridesync::id::canonical_edge_id;
use ridesync::types::{EdgeState, NotificationKind, RelationshipEdge, decode};
use ridesync::{DocRef, DocumentStore, RelationshipState};

use crate::support::{FailingNotifier, Harness};

const EDGES: &str = "friendships";

#[tokio::test]
async fn duplicate_requests_are_rejected_in_both_directions() {
    let harness = Harness::new();
    let ledger = harness.ledger();

    let edge = ledger.send_request("ana", "ben").await.expect("first request");
    assert_eq!(edge.state, EdgeState::Pending);
    assert_eq!(edge.initiator, "ana");

    let same = ledger.send_request("ana", "ben").await;
    assert!(matches!(same, Err(SyncError::AlreadyExists { .. })), "{same:?}");
    let mirrored = ledger.send_request("ben", "ana").await;
    assert!(matches!(mirrored, Err(SyncError::AlreadyExists { .. })), "{mirrored:?}");

    assert_eq!(harness.count(EDGES), 1);
}

#[tokio::test]
async fn mirrored_requests_racing_leave_one_edge() {
    let harness = Harness::new();
    let ledger = harness.ledger();

    let (forward, backward) = tokio::join!(ledger.send_request("ana", "ben"), ledger.send_request("ben", "ana"));

    let outcomes = [forward.is_ok(), backward.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "{forward:?} / {backward:?}");
    let loser = if forward.is_ok() { backward } else { forward };
    assert!(matches!(loser, Err(SyncError::AlreadyExists { .. })));
    assert_eq!(harness.count(EDGES), 1);
}

#[tokio::test]
async fn random_edge_ids_still_reject_sequential_duplicates() {
    let harness = Harness::new().with_random_edge_ids();
    let ledger = harness.ledger();

    let edge = ledger.send_request("ana", "ben").await.expect("request");
    assert_ne!(edge.id, canonical_edge_id("ana", "ben"));
    assert!(matches!(
        ledger.send_request("ben", "ana").await,
        Err(SyncError::AlreadyExists { .. })
    ));
    assert_eq!(harness.count(EDGES), 1);
}

#[tokio::test]
async fn at_most_one_edge_through_a_request_lifecycle() {
    let harness = Harness::new();
    let ledger = harness.ledger();

    let edge = ledger.send_request("ana", "ben").await.expect("request");
    ledger.reject_request(&edge.id, "ben").await.expect("reject");
    assert_eq!(ledger.get_state("ana", "ben").await.expect("state"), RelationshipState::None);

    let edge = ledger.send_request("ben", "ana").await.expect("request again");
    ledger.accept_request(&edge.id, "ana").await.expect("accept");
    assert!(matches!(
        ledger.send_request("ana", "ben").await,
        Err(SyncError::AlreadyExists { .. })
    ));

    for (a, b) in [("ana", "ben"), ("ben", "ana")] {
        let found = ledger.find_edge(a, b).await.expect("find");
        assert_eq!(found.map(|edge| edge.state), Some(EdgeState::Accepted));
    }
    assert_eq!(harness.count(EDGES), 1);
    assert_eq!(ledger.get_state("ben", "ana").await.expect("state"), RelationshipState::Accepted);
}

#[tokio::test]
async fn initiator_cannot_accept_their_own_request() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let edge = ledger.send_request("ana", "ben").await.expect("request");

    let err = ledger.accept_request(&edge.id, "ana").await.expect_err("initiator accept");
    assert!(matches!(err, SyncError::Unauthorized { .. }), "{err:?}");

    let doc = harness
        .store
        .get_or_error(&DocRef::of::<RelationshipEdge>(&edge.id))
        .await
        .expect("edge");
    let stored: RelationshipEdge = decode(&doc).expect("decode");
    assert_eq!(stored.state, EdgeState::Pending);
    assert_eq!(
        ledger.get_state("ben", "ana").await.expect("state"),
        RelationshipState::Pending {
            initiator: "ana".into()
        }
    );
}

#[tokio::test]
async fn accepting_twice_is_a_noop() {
    let harness = Harness::new();
    let edge = harness.befriend("ana", "ben").await;
    let again = harness.ledger().accept_request(&edge.id, "ben").await.expect("accept again");
    assert_eq!(again.state, EdgeState::Accepted);
}

#[tokio::test]
async fn accepted_lists_are_symmetric() {
    let harness = Harness::new();
    harness.befriend("ana", "ben").await;
    harness.befriend("carla", "ana").await;
    harness.ledger().send_request("dani", "ana").await.expect("pending");

    let ledger = harness.ledger();
    let mut friends = ledger.list_accepted("ana").await.expect("ana friends");
    assert_eq!(friends.len(), 2);
    assert!(friends.contains("ben") && friends.contains("carla"));
    assert!(!friends.contains("dani"));
    let first_pass: Vec<String> = friends.by_ref().collect();
    friends.restart();
    assert_eq!(friends.collect::<Vec<_>>(), first_pass);

    assert!(ledger.list_accepted("ben").await.expect("ben friends").contains("ana"));
    let pending = ledger.list_pending_incoming("ana").await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].initiator, "dani");
}

#[tokio::test]
async fn requests_notify_the_recipient() {
    let harness = Harness::new();
    harness.ledger().send_request("ana", "ben").await.expect("request");

    let events = harness.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].recipient_id, "ben");
    assert_eq!(events[0].actor_id, "ana");
    assert_eq!(events[0].kind, NotificationKind::FriendRequest);
}

#[tokio::test]
async fn failed_notifications_do_not_fail_the_request() {
    let harness = Harness::with_notifier(FailingNotifier);
    let edge = harness.ledger().send_request("ana", "ben").await.expect("request despite notifier");
    assert_eq!(edge.state, EdgeState::Pending);
    assert_eq!(harness.count(EDGES), 1);
}

#[tokio::test]
async fn offline_store_is_unreachable() {
    let harness = Harness::new();
    harness.store.set_offline(true);
    let err = harness.ledger().send_request("ana", "ben").await.expect_err("offline");
    assert!(matches!(err, SyncError::Unreachable { .. }));
    assert!(err.is_retryable());

    harness.store.set_offline(false);
    assert!(harness.ledger().send_request("ana", "ben").await.is_ok());
}

#[tokio::test]
async fn underscored_ids_keep_their_pairs_apart() {
    let harness = Harness::new();
    let ledger = harness.ledger();

    let first = ledger.send_request("a_b", "c").await.expect("first pair");
    let second = ledger.send_request("a", "b_c").await.expect("second pair");
    assert_ne!(first.id, second.id);
    assert_eq!(harness.count(EDGES), 2);

    ledger.accept_request(&first.id, "c").await.expect("accept");
    assert_eq!(ledger.get_state("c", "a_b").await.expect("state"), RelationshipState::Accepted);
    assert_eq!(
        ledger.get_state("b_c", "a").await.expect("state"),
        RelationshipState::Pending { initiator: "a".into() }
    );
}
