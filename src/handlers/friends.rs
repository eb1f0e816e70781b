//! Bus adapters for the friend-request subsystem. Every subject decodes its
//! packet, calls the registry, replies with the three-field envelope, and
//! broadcasts the matching notify on success.

use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use crate::bus::{Bus, subjects};
use crate::protocol::FriendCode;
use crate::protocol::packets::{
    FriendByIdPacket, FriendPairPacket, FriendRequestNotifyPacket, FriendResponse,
};
use crate::registry::friends::{FriendRegistry, FriendRequest};

pub async fn register(bus: &Bus, registry: &Arc<FriendRegistry>) -> anyhow::Result<()> {
    request_handler(bus.clone(), registry.clone()).await?;
    accept_handler(bus.clone(), registry.clone()).await?;
    accept_by_id_handler(bus.clone(), registry.clone()).await?;
    decline_handler(bus.clone(), registry.clone()).await?;
    decline_by_id_handler(bus.clone(), registry.clone()).await?;
    Ok(())
}

async fn request_handler(bus: Bus, registry: Arc<FriendRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::FRIENDS_REQUEST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let req: FriendRequest = match serde_json::from_slice(&msg.payload) {
                Ok(req) => req,
                Err(e) => {
                    warn!(error = %e, "invalid friend request payload");
                    bus.respond_json(
                        &msg,
                        &FriendResponse::err(
                            FriendCode::InvalidMessageFormat,
                            "could not parse friend request",
                        ),
                    )
                    .await;
                    continue;
                }
            };

            let (accepted, accepted_inverse, request_id) = match registry.add_or_update(req) {
                Ok(outcome) => outcome,
                Err(code) => {
                    // The mutation stands; only the broadcast was lost.
                    bus.respond_json(
                        &msg,
                        &FriendResponse::err(code, "acceptance broadcast failed"),
                    )
                    .await;
                    continue;
                }
            };
            if !accepted {
                bus.respond_json(
                    &msg,
                    &FriendResponse::err(
                        FriendCode::AlreadySent,
                        "a request between these players is already pending",
                    ),
                )
                .await;
                continue;
            }

            // The inverse fast-accept already broadcast its acceptance from
            // inside the registry; only a fresh request gets a request notify.
            if !accepted_inverse && let Some(request_id) = request_id {
                let delivered = bus
                    .publish_json(
                        subjects::FRIENDS_REQUEST_NOTIFY,
                        &FriendRequestNotifyPacket {
                            request_id,
                            sender: req.sender,
                            recipient: req.recipient,
                            expiry: req.expiry,
                        },
                    )
                    .await;
                if !delivered {
                    bus.respond_json(
                        &msg,
                        &FriendResponse::err(
                            FriendCode::BroadcastFailed,
                            "request stored but its notify failed",
                        ),
                    )
                    .await;
                    continue;
                }
            }

            bus.respond_json(&msg, &FriendResponse::ok("request processed")).await;
        }
    });
    Ok(())
}

async fn accept_handler(bus: Bus, registry: Arc<FriendRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::FRIENDS_ACCEPT).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<FriendPairPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid friend pair payload");
                bus.respond_json(
                    &msg,
                    &FriendResponse::err(FriendCode::InvalidMessageFormat, "could not parse packet"),
                )
                .await;
                continue;
            };

            resolve(
                &bus,
                &msg,
                registry.accept(packet.sender, packet.recipient),
                subjects::FRIENDS_ACCEPT_NOTIFY,
            )
            .await;
        }
    });
    Ok(())
}

async fn accept_by_id_handler(bus: Bus, registry: Arc<FriendRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::FRIENDS_ACCEPT_BY_ID).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<FriendByIdPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid friend id payload");
                bus.respond_json(
                    &msg,
                    &FriendResponse::err(FriendCode::InvalidMessageFormat, "could not parse packet"),
                )
                .await;
                continue;
            };

            resolve(
                &bus,
                &msg,
                registry.accept_by_id(packet.request_id),
                subjects::FRIENDS_ACCEPT_NOTIFY,
            )
            .await;
        }
    });
    Ok(())
}

async fn decline_handler(bus: Bus, registry: Arc<FriendRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::FRIENDS_DECLINE).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<FriendPairPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid friend pair payload");
                bus.respond_json(
                    &msg,
                    &FriendResponse::err(FriendCode::InvalidMessageFormat, "could not parse packet"),
                )
                .await;
                continue;
            };

            resolve(
                &bus,
                &msg,
                registry.decline(packet.sender, packet.recipient),
                subjects::FRIENDS_DECLINE_NOTIFY,
            )
            .await;
        }
    });
    Ok(())
}

async fn decline_by_id_handler(bus: Bus, registry: Arc<FriendRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::FRIENDS_DECLINE_BY_ID).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<FriendByIdPacket>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid friend id payload");
                bus.respond_json(
                    &msg,
                    &FriendResponse::err(FriendCode::InvalidMessageFormat, "could not parse packet"),
                )
                .await;
                continue;
            };

            resolve(
                &bus,
                &msg,
                registry.decline_by_id(packet.request_id),
                subjects::FRIENDS_DECLINE_NOTIFY,
            )
            .await;
        }
    });
    Ok(())
}

/// Shared tail for accept/decline: broadcast the resolved request, then
/// reply. A lost broadcast is reported to the caller; the resolution itself
/// is never undone.
async fn resolve(
    bus: &Bus,
    msg: &async_nats::Message,
    resolved: Option<FriendRequest>,
    notify_subject: &str,
) {
    match resolved {
        Some(req) => {
            if !bus.publish_json(notify_subject, &req).await {
                bus.respond_json(
                    msg,
                    &FriendResponse::err(
                        FriendCode::BroadcastFailed,
                        "request resolved but its notify failed",
                    ),
                )
                .await;
                return;
            }
            bus.respond_json(msg, &FriendResponse::ok("request resolved")).await;
        }
        None => {
            bus.respond_json(
                msg,
                &FriendResponse::err(FriendCode::NotFound, "no matching request"),
            )
            .await;
        }
    }
}
