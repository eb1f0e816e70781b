//! Bus adapters for the party subsystem. Registry mutations publish their
//! own notifications; these handlers decode, dispatch, and reply with the
//! `{success, message}` envelope.

use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use crate::bus::{Bus, subjects};
use crate::protocol::ErrorCode;
use crate::protocol::packets::{
    PartyLeaveRequestPacket, PartyOnePlayerPacket, PartyResponse, PartyStateChangePacket,
    PartyTwoPlayerPacket,
};
use crate::registry::parties::PartyRegistry;

pub async fn register(bus: &Bus, registry: &Arc<PartyRegistry>) -> anyhow::Result<()> {
    disband_handler(bus.clone(), registry.clone()).await?;
    join_handler(bus.clone(), registry.clone()).await?;
    leave_handler(bus.clone(), registry.clone()).await?;
    promote_handler(bus.clone(), registry.clone()).await?;
    transfer_handler(bus.clone(), registry.clone()).await?;
    kick_handler(bus.clone(), registry.clone()).await?;
    yoink_handler(bus.clone(), registry.clone()).await?;
    state_handler(bus.clone(), registry.clone()).await?;
    fetch_handler(bus.clone(), registry.clone()).await?;
    Ok(())
}

async fn invalid(bus: &Bus, msg: &async_nats::Message, packet_kind: &str) {
    warn!(subject = %msg.subject, packet_kind, "invalid party packet");
    bus.respond_json(msg, &PartyResponse::err(ErrorCode::InvalidMessageFormat))
        .await;
}

async fn reply(bus: &Bus, msg: &async_nats::Message, result: Result<(), ErrorCode>) {
    bus.respond_json(msg, &PartyResponse::from(result)).await;
}

async fn disband_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_DISBAND_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyOnePlayerPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyOnePlayerPacket").await;
                continue;
            };
            let result = registry.disband(packet.party_id, packet.player_id);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn join_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_JOIN_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyOnePlayerPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyOnePlayerPacket").await;
                continue;
            };
            // The terminal segment selects the variant; `bypass` joins a
            // closed party as if invited.
            let bypass = bus
                .strip(msg.subject.as_str())
                .ends_with(".bypass");
            let result = registry.join_party(packet.party_id, packet.player_id, bypass);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn leave_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_LEAVE_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyLeaveRequestPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyLeaveRequestPacket").await;
                continue;
            };
            let result = registry.leave_party(packet.player_id);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn promote_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_PROMOTE_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyTwoPlayerPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyTwoPlayerPacket").await;
                continue;
            };
            let result = registry.promote(packet.sender_id, packet.party_id, packet.player_id);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn transfer_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_TRANSFER_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyTwoPlayerPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyTwoPlayerPacket").await;
                continue;
            };
            let result = registry.transfer(packet.sender_id, packet.party_id, packet.player_id);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn kick_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_KICK_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyTwoPlayerPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyTwoPlayerPacket").await;
                continue;
            };
            let result = registry.kick(packet.sender_id, packet.party_id, packet.player_id);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn yoink_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_YOINK_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyOnePlayerPacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyOnePlayerPacket").await;
                continue;
            };
            let result = registry.yoink(packet.player_id, packet.party_id);
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn state_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_STATE_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyStateChangePacket>(&msg.payload) else {
                invalid(&bus, &msg, "PartyStateChangePacket").await;
                continue;
            };

            // party.state.<action>.request
            let stripped = bus.strip(msg.subject.as_str());
            let parts: Vec<&str> = stripped.split('.').collect();
            let action = if parts.len() == 4 { parts[2] } else { "" };

            let result = match action {
                "mute" => registry.toggle_mute(packet.player_id, packet.party_id, packet.state),
                "open" => registry.toggle_open(packet.player_id, packet.party_id, packet.state),
                "open_invites" => {
                    registry.toggle_open_invites(packet.player_id, packet.party_id, packet.state)
                }
                _ => {
                    warn!(subject = %msg.subject, "invalid party state action");
                    Err(ErrorCode::InvalidAction)
                }
            };
            reply(&bus, &msg, result).await;
        }
    });
    Ok(())
}

async fn fetch_handler(bus: Bus, registry: Arc<PartyRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_FETCH_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let parties = registry.get_all_parties();
            bus.respond_json(&msg, &parties).await;
        }
    });
    Ok(())
}
