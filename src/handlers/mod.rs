//! The bus adapter layer: one module per subsystem, each subscribing to its
//! subjects at startup and spawning a long-lived task per subscription.
//! A failed subscribe is fatal — a handler that never attaches is a silently
//! dead service.

pub mod friends;
pub mod instances;
pub mod invites;
pub mod parties;
pub mod players;
pub mod servers;

use std::sync::Arc;

use crate::bus::Bus;
use crate::metrics::Metrics;
use crate::orchestrator::Orchestrator;
use crate::registry::friends::FriendRegistry;
use crate::registry::invites::InviteRegistry;
use crate::registry::parties::PartyRegistry;
use crate::registry::servers::ServerRegistry;

#[allow(clippy::too_many_arguments)]
pub async fn register_all(
    bus: &Bus,
    server_registry: &Arc<ServerRegistry>,
    friend_registry: &Arc<FriendRegistry>,
    party_registry: &Arc<PartyRegistry>,
    invite_registry: &Arc<InviteRegistry>,
    orchestrator: &Arc<dyn Orchestrator>,
    metrics: &Arc<Metrics>,
) -> anyhow::Result<()> {
    servers::register(bus, server_registry, metrics).await?;
    friends::register(bus, friend_registry).await?;
    parties::register(bus, party_registry).await?;
    invites::register(bus, invite_registry).await?;
    players::register(bus, party_registry).await?;
    instances::register(bus, orchestrator).await?;
    Ok(())
}
