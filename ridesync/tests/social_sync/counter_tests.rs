use ridesync::errors::SyncError;
use ridesync::id::like_marker_id;
use ridesync::store::Fields;
use ridesync::types::{AuthorSnapshot, NotificationKind};
use ridesync::{DocRef, DocumentStore, LikeOutcome};
use serde_json::json;

use crate::support::{FailingNotifier, Harness};

const LIKES: &str = "likes";
const COMMENTS: &str = "comments";

fn author(id: &str) -> AuthorSnapshot {
    AuthorSnapshot {
        user_id: id.into(),
        username: id.to_uppercase(),
        avatar_url: String::new(),
    }
}

#[tokio::test]
async fn like_toggle_round_trip() {
    let harness = Harness::new();
    harness.route_with_counts("x", "ana", 5, 0).await;
    let counters = harness.counters();

    let liked = counters.toggle_like("x", "u").await.expect("like");
    assert_eq!(liked, LikeOutcome { liked: true, count: 6 });
    assert!(counters.has_liked("x", "u").await.expect("marker"));

    let unliked = counters.toggle_like("x", "u").await.expect("unlike");
    assert_eq!(unliked, LikeOutcome { liked: false, count: 5 });
    assert!(!counters.has_liked("x", "u").await.expect("marker"));
    assert_eq!(harness.content("x").await.likes_count, 5);
}

#[tokio::test]
async fn interleaved_toggles_match_the_markers() {
    let harness = Harness::new().with_max_attempts(16);
    harness.route_with_counts("x", "ana", 0, 0).await;
    let counters = harness.counters();

    let (a, b, c, d, e, f) = tokio::join!(
        counters.toggle_like("x", "u1"),
        counters.toggle_like("x", "u2"),
        counters.toggle_like("x", "u3"),
        counters.toggle_like("x", "u4"),
        counters.toggle_like("x", "u5"),
        counters.toggle_like("x", "u6"),
    );
    for outcome in [a, b, c, d, e, f] {
        assert!(outcome.expect("toggle").liked);
    }
    let (b, e) = tokio::join!(counters.toggle_like("x", "u2"), counters.toggle_like("x", "u5"));
    assert!(!b.expect("unlike").liked);
    assert!(!e.expect("unlike").liked);

    assert_eq!(harness.content("x").await.likes_count, 4);
    assert_eq!(harness.count(LIKES), 4);
    for user in ["u1", "u3", "u4", "u6"] {
        assert!(counters.has_liked("x", user).await.expect("marker"));
    }
}

#[tokio::test]
async fn one_user_toggling_never_undercuts_the_others() {
    let harness = Harness::new();
    harness.route_with_counts("x", "ana", 0, 0).await;
    let counters = harness.counters();
    counters.toggle_like("x", "ben").await.expect("ben");
    counters.toggle_like("x", "carla").await.expect("carla");

    for round in 0..7 {
        let outcome = counters.toggle_like("x", "dani").await.expect("dani");
        assert!(outcome.count >= 2, "round {round}: {outcome:?}");
        assert_eq!(outcome.count, if outcome.liked { 3 } else { 2 });
    }
    assert_eq!(harness.content("x").await.likes_count, 3);
}

#[tokio::test]
async fn unlike_floors_at_zero() {
    let harness = Harness::new();
    harness.route_with_counts("x", "ana", 0, 0).await;
    // A marker whose like was never counted.
    let mut fields = Fields::new();
    fields.insert("content_id".into(), json!("x"));
    fields.insert("user_id".into(), json!("ben"));
    fields.insert("created_at".into(), json!(0));
    harness
        .store
        .set(&DocRef::new(LIKES, like_marker_id("x", "ben")), fields)
        .await
        .expect("seed marker");

    let outcome = harness.counters().toggle_like("x", "ben").await.expect("unlike");
    assert_eq!(outcome, LikeOutcome { liked: false, count: 0 });
    assert_eq!(harness.content("x").await.likes_count, 0);
}

#[tokio::test]
async fn likes_notify_the_creator_but_not_themselves() {
    let harness = Harness::new();
    harness.route_with_counts("x", "ana", 0, 0).await;
    let counters = harness.counters();

    counters.toggle_like("x", "ben").await.expect("like");
    counters.toggle_like("x", "ben").await.expect("unlike");
    counters.toggle_like("x", "ana").await.expect("own like");

    let events = harness.notifier.events();
    assert_eq!(events.len(), 1, "{events:?}");
    assert_eq!(events[0].kind, NotificationKind::Like);
    assert_eq!(events[0].recipient_id, "ana");
    assert_eq!(events[0].actor_id, "ben");
    assert_eq!(events[0].content_id.as_deref(), Some("x"));
}

#[tokio::test]
async fn comment_increments_counter_exactly_once() {
    let harness = Harness::new();
    harness.route_with_counts("y", "ana", 0, 0).await;
    let counters = harness.counters();

    let comment = counters.add_comment("y", &author("ben"), "  hi  ").await.expect("comment");
    assert_eq!(comment.text, "hi");
    assert_eq!(comment.content_id, "y");
    assert_eq!(comment.author.username, "BEN");

    assert_eq!(harness.content("y").await.comments_count, 1);
    assert_eq!(harness.count(COMMENTS), 1);
    let listed = counters.list_comments("y", 10).await.expect("list");
    assert_eq!(listed, vec![comment]);

    let events = harness.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, NotificationKind::Comment);
}

#[tokio::test]
async fn comments_on_missing_routes_leave_nothing_behind() {
    let harness = Harness::new();
    let err = harness
        .counters()
        .add_comment("nope", &author("ben"), "hi")
        .await
        .expect_err("missing route");
    assert!(matches!(err, SyncError::NotFound { .. }));
    assert_eq!(harness.count(COMMENTS), 0);
}

#[tokio::test]
async fn comments_list_oldest_first() {
    let harness = Harness::new();
    harness.route_with_counts("y", "ana", 0, 0).await;
    let counters = harness.counters();
    for text in ["first", "second", "third"] {
        counters.add_comment("y", &author("ben"), text).await.expect("comment");
    }
    let texts: Vec<String> = counters
        .list_comments("y", 2)
        .await
        .expect("list")
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(texts, ["first", "second"]);
    assert_eq!(harness.content("y").await.comments_count, 3);
}

#[tokio::test]
async fn failing_notifier_does_not_fail_interactions() {
    let harness = Harness::with_notifier(FailingNotifier);
    harness.route_with_counts("x", "ana", 0, 0).await;
    let counters = harness.counters();

    assert!(counters.toggle_like("x", "ben").await.expect("like").liked);
    counters.add_comment("x", &author("ben"), "nice").await.expect("comment");
    let item = harness.content("x").await;
    assert_eq!((item.likes_count, item.comments_count), (1, 1));
}

#[tokio::test]
async fn exhausted_retries_surface_write_conflict_and_change_nothing() {
    let harness = Harness::new();
    harness.route_with_counts("x", "ana", 2, 0).await;
    let counters = harness.counters();

    harness.store.inject_conflicts(5);
    let err = counters.toggle_like("x", "ben").await.expect_err("conflict");
    assert!(matches!(err, SyncError::WriteConflict { attempts: 5 }), "{err:?}");
    assert!(err.is_retryable());
    assert_eq!(harness.content("x").await.likes_count, 2);
    assert_eq!(harness.count(LIKES), 0);
    assert!(harness.notifier.events().is_empty());

    harness.store.inject_conflicts(2);
    let outcome = counters.toggle_like("x", "ben").await.expect("retried like");
    assert_eq!(outcome, LikeOutcome { liked: true, count: 3 });
}

#[tokio::test]
async fn offline_store_rejects_interactions() {
    let harness = Harness::new();
    harness.route_with_counts("x", "ana", 0, 0).await;
    harness.store.set_offline(true);

    let like = harness.counters().toggle_like("x", "ben").await;
    assert!(matches!(like, Err(SyncError::Unreachable { .. })));
    let comment = harness.counters().add_comment("x", &author("ben"), "hi").await;
    assert!(matches!(comment, Err(SyncError::Unreachable { .. })));

    harness.store.set_offline(false);
    assert_eq!(harness.content("x").await.likes_count, 0);
}
