use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use nexus::bus::Bus;
use nexus::config::ServiceConfig;
use nexus::handlers;
use nexus::metrics::{self, Metrics};
use nexus::orchestrator::{NomadClient, Orchestrator};
use nexus::registry::friends::FriendRegistry;
use nexus::registry::invites::InviteRegistry;
use nexus::registry::parties::PartyRegistry;
use nexus::registry::servers::ServerRegistry;

/// How often the fleet is probed, and how long each server gets to answer.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::load("nexus.toml");

    // Metrics endpoint
    let metrics = Metrics::new();
    tokio::spawn(metrics::serve(config.metrics.address.clone(), metrics.clone()));

    // Connect to the bus
    let bus = Bus::connect(&config.bus).await.expect("failed to connect to NATS");
    let notifier = bus.notifier();

    // Build the registries
    let server_registry = ServerRegistry::new(notifier.clone(), metrics.clone());
    let friend_registry = FriendRegistry::new(notifier.clone());
    let party_registry = PartyRegistry::new(notifier.clone());
    let invite_registry = InviteRegistry::new(party_registry.clone(), notifier);

    let orchestrator: Arc<dyn Orchestrator> = Arc::new(NomadClient::new(&config.orchestrator));

    // Attach every subject handler; any failure here is fatal.
    handlers::register_all(
        &bus,
        &server_registry,
        &friend_registry,
        &party_registry,
        &invite_registry,
        &orchestrator,
        &metrics,
    )
    .await
    .expect("failed to subscribe handlers");

    // Periodic fleet health checks
    {
        let bus = bus.clone();
        let registry = server_registry.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            ticker.tick().await; // the first tick is immediate; skip it
            loop {
                ticker.tick().await;
                registry.health_check(&bus, HEALTH_CHECK_TIMEOUT).await;
            }
        });
    }

    info!("nexus coordination service up");

    tokio::signal::ctrl_c().await.expect("failed to listen for shutdown signal");
    info!("shutting down");
}
