//! Bus adapters for party invites. The send reply carries the serialized
//! invite so the sender's server learns the generated id immediately; the
//! broadcast carries the same body for everyone else.

use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use crate::bus::{Bus, subjects};
use crate::protocol::ErrorCode;
use crate::protocol::packets::{PartyInviteAcceptPacket, PartyInviteSendPacket, PartyResponse};
use crate::registry::invites::InviteRegistry;

pub async fn register(bus: &Bus, registry: &Arc<InviteRegistry>) -> anyhow::Result<()> {
    send_handler(bus.clone(), registry.clone()).await?;
    accept_handler(bus.clone(), registry.clone()).await?;
    Ok(())
}

async fn send_handler(bus: Bus, registry: Arc<InviteRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_INVITES_SEND).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyInviteSendPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid invite send payload");
                bus.respond_json(&msg, &PartyResponse::err(ErrorCode::InvalidMessageFormat))
                    .await;
                continue;
            };

            let invite =
                match registry.create_invite(packet.sender_id, packet.party_id, packet.recipient_id)
                {
                    Ok(invite) => invite,
                    Err(code) => {
                        bus.respond_json(&msg, &PartyResponse::err(code)).await;
                        continue;
                    }
                };

            let Ok(serialized) = serde_json::to_string(&invite) else {
                bus.respond_json(&msg, &PartyResponse::err(ErrorCode::MarshalInvite))
                    .await;
                continue;
            };

            // The invite exists either way; a failed broadcast is reported
            // but never rolled back.
            if !bus.publish_json(subjects::PARTY_INVITES_SEND_NOTIFY, &invite).await {
                bus.respond_json(&msg, &PartyResponse::err(ErrorCode::BroadcastFailed))
                    .await;
                continue;
            }

            bus.respond_json(&msg, &PartyResponse::ok_with(serialized)).await;
        }
    });
    Ok(())
}

async fn accept_handler(bus: Bus, registry: Arc<InviteRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::PARTY_INVITES_ACCEPT).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<PartyInviteAcceptPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid invite accept payload");
                bus.respond_json(&msg, &PartyResponse::err(ErrorCode::InvalidMessageFormat))
                    .await;
                continue;
            };

            match registry.accept(packet.request_id) {
                Ok(invite) => {
                    if !bus
                        .publish_json(subjects::PARTY_INVITES_ACCEPT_NOTIFY, &invite)
                        .await
                    {
                        bus.respond_json(&msg, &PartyResponse::err(ErrorCode::BroadcastFailed))
                            .await;
                        continue;
                    }
                    bus.respond_json(&msg, &PartyResponse::ok()).await;
                }
                Err(code) => {
                    bus.respond_json(&msg, &PartyResponse::err(code)).await;
                }
            }
        }
    });
    Ok(())
}
