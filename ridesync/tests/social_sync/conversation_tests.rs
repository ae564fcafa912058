use ridesync::errors::SyncError;
use ridesync::types::RelationshipEdge;
use ridesync::{DocRef, DocumentStore, FriendsOverview, conversation_id};

use crate::support::{Harness, overview_until};

fn names(overview: &FriendsOverview) -> Vec<&str> {
    overview
        .friends
        .iter()
        .map(|f| f.counterpart.display_name.as_str())
        .collect()
}

async fn riders(harness: &Harness) {
    for (id, name) in [("ana", "Ana"), ("ben", "Ben"), ("carla", "Carla"), ("dani", "Dani")] {
        harness.rider(id, name).await;
    }
}

#[tokio::test]
async fn friends_without_messages_show_the_placeholder() {
    let harness = Harness::new();
    riders(&harness).await;
    harness.befriend("ana", "carla").await;
    harness.befriend("ben", "ana").await;

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");

    assert_eq!(names(&overview), ["Ben", "Carla"]);
    for friend in &overview.friends {
        assert_eq!(friend.last_message_text, "Start a conversation!");
        assert_eq!(friend.time_label, "");
        assert!(!friend.unread);
        assert!(!friend.counterpart.avatar_url.is_empty());
    }
    assert_eq!(overview.friends[0].conversation_id, conversation_id("ben", "ana"));
    assert_eq!(overview.pending_requests, 0);
    assert_eq!(friends.conversation_watch_count(), 2);
}

#[tokio::test]
async fn most_recent_conversation_comes_first() {
    let harness = Harness::new();
    riders(&harness).await;
    harness.befriend("ana", "ben").await;
    harness.befriend("ana", "carla").await;
    harness.befriend("ana", "dani").await;
    let messages = harness.messages();
    messages.record_message("ana", "dani", "older").await.expect("message");
    messages.record_message("carla", "ana", "newer").await.expect("message");

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");
    assert_eq!(names(&overview), ["Carla", "Dani", "Ben"]);
    assert_eq!(overview.friends[0].last_message_text, "newer");
    assert!(overview.friends[0].unread);
    assert!(!overview.friends[1].unread, "sent by the viewer");
    assert!(!overview.friends[0].time_label.is_empty());

    messages.record_message("ben", "ana", "newest").await.expect("message");
    let overview = overview_until(&mut friends, |o| o.friends[0].counterpart.user_id == "ben").await;
    assert_eq!(names(&overview), ["Ben", "Carla", "Dani"]);
    assert_eq!(overview.friends[0].last_message_text, "newest");
}

#[tokio::test]
async fn reading_a_conversation_clears_the_unread_flag() {
    let harness = Harness::new();
    riders(&harness).await;
    harness.befriend("ben", "ana").await;
    harness.messages().record_message("ben", "ana", "Letras?").await.expect("message");

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");
    assert!(overview.friends[0].unread);

    harness.messages().mark_read("ana", "ben").await.expect("mark read");
    let overview = overview_until(&mut friends, |o| !o.friends[0].unread).await;
    assert_eq!(overview.friends[0].last_message_text, "Letras?");

    let mut bens = harness.summarizer().subscribe("ben").await.expect("subscribe");
    let overview = bens.next().await.expect("overview").expect("open");
    assert!(!overview.friends[0].unread);
}

#[tokio::test]
async fn pending_badge_tracks_incoming_requests() {
    let harness = Harness::new();
    riders(&harness).await;
    harness.ledger().send_request("ana", "ben").await.expect("outgoing");

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");
    assert_eq!(overview.pending_requests, 0, "outgoing requests are not counted");
    assert!(overview.friends.is_empty());

    let edge = harness.ledger().send_request("dani", "ana").await.expect("incoming");
    let overview = overview_until(&mut friends, |o| o.pending_requests == 1).await;
    assert!(overview.friends.is_empty());

    harness.ledger().accept_request(&edge.id, "ana").await.expect("accept");
    let overview = overview_until(&mut friends, |o| o.pending_requests == 0 && o.friends.len() == 1).await;
    assert_eq!(names(&overview), ["Dani"]);
    assert_eq!(friends.conversation_watch_count(), 1);
}

#[tokio::test]
async fn removed_friends_leave_and_release_their_watch() {
    let harness = Harness::new();
    riders(&harness).await;
    let edge = harness.befriend("ana", "ben").await;
    harness.befriend("ana", "carla").await;

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    friends.next().await.expect("overview").expect("open");
    assert_eq!(friends.conversation_watch_count(), 2);

    harness
        .store
        .delete(&DocRef::of::<RelationshipEdge>(&edge.id))
        .await
        .expect("unfriend");
    let overview = overview_until(&mut friends, |o| o.friends.len() == 1).await;
    assert_eq!(names(&overview), ["Carla"]);
    assert_eq!(friends.conversation_watch_count(), 1);
}

#[tokio::test]
async fn friends_without_profiles_use_the_placeholder_name() {
    let harness = Harness::new();
    harness.befriend("ana", "ghost").await;
    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");
    assert_eq!(names(&overview), ["User"]);
    assert_eq!(overview.friends[0].counterpart.user_id, "ghost");
}

#[tokio::test]
async fn disposing_releases_every_listener() {
    let harness = Harness::new();
    riders(&harness).await;
    harness.befriend("ana", "ben").await;
    harness.befriend("ana", "carla").await;

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    friends.next().await.expect("overview").expect("open");
    // Edges, pending requests and one conversation per friend.
    assert_eq!(harness.store.watcher_count(), 4);

    friends.dispose();
    assert_eq!(harness.store.watcher_count(), 0);
}

#[tokio::test]
async fn self_messages_are_invalid() {
    let harness = Harness::new();
    let err = harness
        .messages()
        .record_message("ana", "ana", "hello me")
        .await
        .expect_err("self message");
    assert!(matches!(err, SyncError::InvalidState { .. }));
}

#[tokio::test]
async fn underscored_ids_do_not_share_a_conversation() {
    let harness = Harness::new();
    for (id, name) in [("a", "Alba"), ("a_b", "Alba Bravo"), ("b_c", "Bruno Cid"), ("c", "Cata")] {
        harness.rider(id, name).await;
    }
    harness.befriend("a_b", "c").await;
    harness.befriend("a", "b_c").await;
    harness
        .messages()
        .record_message("a_b", "c", "private between a_b and c")
        .await
        .expect("message");

    let mut friends = harness.summarizer().subscribe("a").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");
    assert_eq!(names(&overview), ["Bruno Cid"]);
    assert_eq!(overview.friends[0].last_message_text, "Start a conversation!");
    assert!(!overview.friends[0].unread);
}

#[tokio::test]
async fn friend_names_appear_once_their_profile_exists() {
    let harness = Harness::new();
    harness.rider("ana", "Ana").await;
    harness.befriend("ana", "ben").await;

    let mut friends = harness.summarizer().subscribe("ana").await.expect("subscribe");
    let overview = friends.next().await.expect("overview").expect("open");
    assert_eq!(names(&overview), ["User"]);

    harness.rider("ben", "Ben").await;
    harness.messages().record_message("ben", "ana", "hola").await.expect("message");
    let overview = overview_until(&mut friends, |o| o.friends[0].last_message_text == "hola").await;
    assert_eq!(names(&overview), ["Ben"]);
}
