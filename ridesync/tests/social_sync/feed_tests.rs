use ridesync::errors::SyncError;
use ridesync::store::Fields;
use ridesync::types::ContentItem;
use ridesync::{DocRef, DocumentStore};
use serde_json::json;

use crate::support::{Harness, feed_until};

#[tokio::test]
async fn first_projection_is_newest_first_with_creator_cards() {
    let harness = Harness::new();
    harness.rider("ben", "Ben").await;
    let older = harness.route("ben", "Alto de Letras").await;
    let newer = harness.route("ghost", "Night ride").await;

    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    let entries = feed.next().await.expect("projection").expect("open");

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, [newer.id.as_str(), older.id.as_str()]);
    assert_eq!(entries[1].creator.display_name, "Ben");
    // No profile for this creator.
    assert_eq!(entries[0].creator.display_name, "User");
    assert_eq!(entries[0].creator.user_id, "ghost");
    assert!(entries.iter().all(|e| !e.viewer_has_liked && e.likes == 0));
    assert_eq!(feed.marker_watch_count(), 2);
}

#[tokio::test]
async fn rapid_updates_to_one_item_never_duplicate_it() {
    let harness = Harness::new();
    let route = harness.route("ben", "Draft").await;
    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    feed.next().await.expect("projection").expect("open");

    let reference = DocRef::of::<ContentItem>(&route.id);
    for title in ["Optimistic title", "Server title"] {
        let mut fields = Fields::new();
        fields.insert("title".into(), json!(title));
        harness.store.update(&reference, fields).await.expect("update");
    }

    let entries = feed_until(&mut feed, |entries| entries.iter().any(|e| e.title == "Server title")).await;
    assert_eq!(entries.iter().filter(|e| e.id == route.id).count(), 1);
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn likes_flow_into_the_projection() {
    let harness = Harness::new();
    let route = harness.route("ben", "Letras").await;
    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    feed.next().await.expect("projection").expect("open");

    let counters = harness.counters();
    counters.toggle_like(&route.id, "ana").await.expect("viewer like");
    let entries = feed_until(&mut feed, |entries| entries[0].viewer_has_liked && entries[0].likes == 1).await;
    assert_eq!(entries.len(), 1);

    counters.toggle_like(&route.id, "carla").await.expect("other like");
    let entries = feed_until(&mut feed, |entries| entries[0].likes == 2).await;
    assert!(entries[0].viewer_has_liked);

    counters.toggle_like(&route.id, "ana").await.expect("viewer unlike");
    let entries = feed_until(&mut feed, |entries| !entries[0].viewer_has_liked && entries[0].likes == 1).await;
    assert_eq!(entries[0].comments, 0);
}

#[tokio::test]
async fn existing_likes_show_in_the_first_projection() {
    let harness = Harness::new();
    let route = harness.route("ben", "Letras").await;
    harness.counters().toggle_like(&route.id, "ana").await.expect("like");

    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    let entries = feed.next().await.expect("projection").expect("open");
    assert!(entries[0].viewer_has_liked);
    assert_eq!(entries[0].likes, 1);
}

#[tokio::test]
async fn new_and_removed_routes_adjust_marker_watches() {
    let harness = Harness::new();
    let first = harness.route("ben", "One").await;
    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    feed.next().await.expect("projection").expect("open");
    assert_eq!(feed.marker_watch_count(), 1);

    let second = harness.route("carla", "Two").await;
    let entries = feed_until(&mut feed, |entries| entries.len() == 2).await;
    assert_eq!(entries[0].id, second.id);
    assert_eq!(feed.marker_watch_count(), 2);

    harness
        .store
        .delete(&DocRef::of::<ContentItem>(&first.id))
        .await
        .expect("delete");
    let entries = feed_until(&mut feed, |entries| entries.len() == 1).await;
    assert_eq!(entries[0].id, second.id);
    assert_eq!(feed.marker_watch_count(), 1);
}

#[tokio::test]
async fn feed_respects_the_configured_limit() {
    let mut harness = Harness::new();
    harness.settings.feed.limit = 2;
    for title in ["a", "b", "c"] {
        harness.route("ben", title).await;
    }
    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    let entries = feed.next().await.expect("projection").expect("open");
    let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["c", "b"]);
}

#[tokio::test]
async fn disposing_releases_every_listener() {
    let harness = Harness::new();
    harness.route("ben", "One").await;
    harness.route("carla", "Two").await;

    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    feed.next().await.expect("projection").expect("open");
    assert_eq!(harness.store.watcher_count(), 3);

    feed.dispose();
    assert_eq!(harness.store.watcher_count(), 0);
}

#[tokio::test]
async fn dropping_the_feed_releases_every_listener() {
    let harness = Harness::new();
    harness.route("ben", "One").await;
    {
        let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
        feed.next().await.expect("projection").expect("open");
        assert_eq!(harness.store.watcher_count(), 2);
    }
    assert_eq!(harness.store.watcher_count(), 0);
}

#[tokio::test]
async fn offline_store_cannot_open_a_feed() {
    let harness = Harness::new();
    harness.store.set_offline(true);
    assert!(harness.feed().subscribe("ana").await.is_err());
    assert_eq!(harness.store.watcher_count(), 0);
}

#[tokio::test]
async fn feed_recovers_after_the_store_was_unreachable() {
    let harness = Harness::new();
    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    assert!(feed.next().await.expect("projection").expect("open").is_empty());

    let route = harness.route("ben", "Letras").await;
    harness.store.set_offline(true);
    let err = feed.next().await.expect_err("store offline");
    assert!(matches!(err, SyncError::Unreachable { .. }), "{err:?}");
    // Only the content watch is left; the half-opened marker watch was released.
    assert_eq!(harness.store.watcher_count(), 1);
    assert_eq!(feed.marker_watch_count(), 0);

    harness.store.set_offline(false);
    let entries = feed.next().await.expect("projection").expect("open");
    assert_eq!(entries.len(), 1);
    assert_eq!(feed.marker_watch_count(), 1);

    harness.counters().toggle_like(&route.id, "ana").await.expect("like");
    let entries = feed_until(&mut feed, |entries| entries[0].likes == 1).await;
    assert!(entries[0].viewer_has_liked);
    assert_eq!(feed.marker_watch_count(), 1);
}

#[tokio::test]
async fn creators_resolve_once_their_profile_exists() {
    let harness = Harness::new();
    harness.route("ben", "Letras").await;
    let mut feed = harness.feed().subscribe("ana").await.expect("subscribe");
    let entries = feed.next().await.expect("projection").expect("open");
    assert_eq!(entries[0].creator.display_name, "User");

    harness.rider("ben", "Ben").await;
    harness.route("ben", "Second ride").await;
    let entries = feed_until(&mut feed, |entries| entries.len() == 2).await;
    let names: Vec<&str> = entries.iter().map(|e| e.creator.display_name.as_str()).collect();
    assert_eq!(names, ["Ben", "Ben"]);
}
