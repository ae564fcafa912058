//! Sample riders, routes and friendships for the in-memory backend.

use std::sync::Arc;

use anyhow::{Context, Result};
use ridesync::config::Settings;
use ridesync::types::{AuthorSnapshot, GeoPoint, Motorcycle, UserProfile};
use ridesync::{
    ConversationLog, CounterEngine, DocumentStore, NewRoute, NotificationPort, ProfileDirectory, RelationshipLedger,
    RouteCatalog,
};

struct Rider {
    id: &'static str,
    name: &'static str,
    city: &'static str,
    bike: (&'static str, &'static str),
}

const RIDERS: [Rider; 4] = [
    Rider { id: "ana", name: "Ana Torres", city: "Bogotá", bike: ("Yamaha", "Ténéré 700") },
    Rider { id: "ben", name: "Ben Okafor", city: "Medellín", bike: ("KTM", "390 Adventure") },
    Rider { id: "carla", name: "Carla Ruiz", city: "Cali", bike: ("Honda", "Africa Twin") },
    Rider { id: "dani", name: "Dani Mejía", city: "Bogotá", bike: ("BMW", "R 1250 GS") },
];

pub async fn seed<S, N>(store: &Arc<S>, notifier: &Arc<N>, settings: &Settings) -> Result<()>
where
    S: DocumentStore,
    N: NotificationPort,
{
    let profiles = ProfileDirectory::new(Arc::clone(store), settings.feed.placeholder_name.clone());
    for rider in &RIDERS {
        let profile = UserProfile::new(rider.id, rider.name)
            .with_city(rider.city)
            .with_motorcycle(Motorcycle {
                brand: rider.bike.0.into(),
                model: rider.bike.1.into(),
                year: None,
            });
        profiles.upsert(profile).await.context("seeding profiles")?;
    }

    let routes = RouteCatalog::new(Arc::clone(store));
    let coast = routes
        .publish(
            "ben",
            NewRoute::new("Alto de Letras").with_description("Ninety kilometres of climbing").with_path(vec![
                GeoPoint { latitude: 5.2056, longitude: -75.0330 },
                GeoPoint { latitude: 5.0392, longitude: -75.3480 },
            ]),
        )
        .await
        .context("seeding routes")?;
    let lakes = routes
        .publish("carla", NewRoute::new("Lago Calima loop").with_description("Windy but worth it"))
        .await
        .context("seeding routes")?;
    // No profile for this creator: the feed shows the placeholder name.
    routes
        .publish("ghost", NewRoute::new("Night ride to La Calera"))
        .await
        .context("seeding routes")?;

    let ledger = RelationshipLedger::new(Arc::clone(store), Arc::clone(notifier), &settings.ledger);
    let edge = ledger.send_request("ben", "ana").await.context("seeding friendships")?;
    ledger.accept_request(&edge.id, "ana").await.context("seeding friendships")?;
    let edge = ledger.send_request("ana", "carla").await.context("seeding friendships")?;
    ledger.accept_request(&edge.id, "carla").await.context("seeding friendships")?;
    ledger.send_request("dani", "ana").await.context("seeding friendships")?;

    let counters = CounterEngine::new(Arc::clone(store), Arc::clone(notifier));
    counters.toggle_like(&coast.id, "carla").await.context("seeding likes")?;
    counters.toggle_like(&coast.id, "ana").await.context("seeding likes")?;
    let author = AuthorSnapshot {
        user_id: "ana".into(),
        username: "Ana Torres".into(),
        avatar_url: String::new(),
    };
    counters
        .add_comment(&lakes.id, &author, "Going there next weekend!")
        .await
        .context("seeding comments")?;

    let messages = ConversationLog::new(Arc::clone(store));
    messages
        .record_message("ben", "ana", "Letras on Sunday?")
        .await
        .context("seeding conversations")?;

    log::debug!("seeded {} riders", RIDERS.len());
    Ok(())
}
