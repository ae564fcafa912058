use std::sync::Arc;

use ridesync::config::Settings;
use ridesync::errors::SyncError;
use ridesync::types::UserProfile;
use ridesync::{Client, MemoryStore, NewRoute, RelationshipState, StaticAuth};

use crate::support::RecordingNotifier;

type TestClient = Client<MemoryStore, StaticAuth, RecordingNotifier>;

fn client(user: Option<&str>) -> (TestClient, Arc<StaticAuth>) {
    let auth = Arc::new(match user {
        Some(id) => StaticAuth::signed_in(id),
        None => StaticAuth::signed_out(),
    });
    let client = Client::new(
        Arc::new(MemoryStore::new()),
        Arc::clone(&auth),
        Arc::new(RecordingNotifier::default()),
        Settings::default(),
    );
    (client, auth)
}

#[tokio::test]
async fn signed_out_users_cannot_act() {
    let (client, _) = client(None);
    assert!(matches!(
        client.toggle_like("r1").await,
        Err(SyncError::Unauthorized { .. })
    ));
    assert!(matches!(
        client.send_request("ben").await,
        Err(SyncError::Unauthorized { .. })
    ));
    assert!(client.subscribe_feed().await.is_err());
}

#[tokio::test]
async fn actions_run_as_the_signed_in_user() {
    let (client, auth) = client(Some("ana"));
    client
        .update_profile(UserProfile::new("", "Ana Torres"))
        .await
        .expect("profile");
    let route = client
        .publish_route(NewRoute::new("Alto de Letras"))
        .await
        .expect("publish");
    assert_eq!(route.creator_id, "ana");

    let comment = client.add_comment(&route.id, "first!").await.expect("comment");
    assert_eq!(comment.author.user_id, "ana");
    assert_eq!(comment.author.username, "Ana Torres");

    let edge = client.send_request("ben").await.expect("request");
    auth.switch_to(Some("ben".into()));
    assert!(client.toggle_like(&route.id).await.expect("like").liked);
    client.accept_request(&edge.id).await.expect("accept");
    assert_eq!(client.relationship_with("ana").await.expect("state"), RelationshipState::Accepted);

    client.send_message("ana", "nice route").await.expect("message");
    auth.switch_to(Some("ana".into()));
    let mut friends = client.subscribe_friends().await.expect("friends");
    let overview = friends.next().await.expect("overview").expect("open");
    assert!(overview.friends[0].unread);
    client.mark_conversation_read("ben").await.expect("read");

    let unread = client.inbox().list_unread("ana", 10).await.expect("inbox");
    assert!(unread.is_empty(), "recording notifier does not write an inbox");
}

#[tokio::test]
async fn profiles_can_only_be_edited_by_their_owner() {
    let (client, _) = client(Some("ana"));
    let err = client
        .update_profile(UserProfile::new("ben", "Not Ben"))
        .await
        .expect_err("foreign profile");
    assert!(matches!(err, SyncError::Unauthorized { .. }));
}

#[tokio::test]
async fn search_skips_the_searching_user() {
    let (client, auth) = client(Some("ana"));
    client.update_profile(UserProfile::new("ana", "Ana Marín")).await.expect("ana");
    auth.switch_to(Some("maria".into()));
    client.update_profile(UserProfile::new("maria", "María")).await.expect("maria");
    auth.switch_to(Some("marco".into()));
    client.update_profile(UserProfile::new("marco", "Marco")).await.expect("marco");

    let hits = client.search_users("Mar").await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|p| p.id.as_str()).collect();
    assert!(ids.contains(&"maria"));
    assert!(!ids.contains(&"marco"));
    assert!(!ids.contains(&"ana"), "prefix search only");
    assert!(client.search_users("ma").await.expect("short").is_empty());
}
