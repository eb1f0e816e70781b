//! Presence adapters: player connect/disconnect events drive the party
//! registry's grace-window machinery. These subjects carry no reply.

use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use crate::bus::{Bus, subjects};
use crate::protocol::packets::PlayerStatusPacket;
use crate::registry::parties::PartyRegistry;

pub async fn register(bus: &Bus, registry: &Arc<PartyRegistry>) -> anyhow::Result<()> {
    connect_handler(bus.clone(), registry.clone()).await?;
    disconnect_handler(bus.clone(), registry.clone()).await?;
    Ok(())
}

async fn connect_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PLAYERS_CONNECT).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PlayerStatusPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid player status payload");
                continue;
            };
            // No reply channel on presence subjects; a lost status broadcast
            // can only be logged.
            if let Err(code) = registry.handle_reconnect(packet.uuid) {
                warn!(player = %packet.uuid, %code, "reconnect broadcast failed");
            }
        }
    });
    Ok(())
}

async fn disconnect_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PLAYERS_DISCONNECT).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PlayerStatusPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid player status payload");
                continue;
            };
            if let Err(code) = registry.handle_disconnect(packet.uuid) {
                warn!(player = %packet.uuid, %code, "disconnect broadcast failed");
            }
        }
    });
    Ok(())
}
