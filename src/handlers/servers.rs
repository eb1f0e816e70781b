//! Bus adapters for the server registry: registration, graceful shutdown,
//! list queries, and the proxy-startup snapshot.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::warn;

use crate::bus::{Bus, subjects};
use crate::metrics::Metrics;
use crate::protocol::packets::InstanceResponse;
use crate::registry::servers::{ServerInfo, ServerRegistry};

#[derive(Serialize)]
struct ServerListResponse {
    servers: Vec<ServerInfo>,
}

pub async fn register(
    bus: &Bus,
    registry: &Arc<ServerRegistry>,
    metrics: &Arc<Metrics>,
) -> anyhow::Result<()> {
    register_handler(bus.clone(), registry.clone(), metrics.clone()).await?;
    shutdown_handler(bus.clone(), registry.clone()).await?;
    list_handler(bus.clone(), registry.clone()).await?;
    proxy_startup_handler(bus.clone(), registry.clone()).await?;
    Ok(())
}

async fn register_handler(
    bus: Bus,
    registry: Arc<ServerRegistry>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_REGISTER).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(info) = serde_json::from_slice::<ServerInfo>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid server info payload");
                metrics.registration_requests.with_label_values(&["error"]).inc();
                bus.respond_json(&msg, &InstanceResponse::err("INVALID_MESSAGE_FORMAT"))
                    .await;
                continue;
            };

            registry.add_or_update(info.clone());
            metrics
                .registration_requests
                .with_label_values(&["success"])
                .inc();

            // Let the proxies pick the new server up before acking; the
            // entry stays registered even when the notify is lost.
            if !bus
                .publish_json(subjects::SERVERS_PROXY_STARTUP_NOTIFY, &info)
                .await
            {
                bus.respond_json(&msg, &InstanceResponse::err("ERR_BROADCAST_FAILED"))
                    .await;
                continue;
            }

            bus.respond_json(&msg, &InstanceResponse::ok()).await;
        }
    });
    Ok(())
}

async fn shutdown_handler(bus: Bus, registry: Arc<ServerRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_SHUTDOWN).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(info) = serde_json::from_slice::<ServerInfo>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid server info payload");
                bus.respond_json(&msg, &InstanceResponse::err("INVALID_MESSAGE_FORMAT"))
                    .await;
                continue;
            };

            registry.remove(&info.id);

            if !bus
                .publish_json(subjects::SERVERS_PROXY_SHUTDOWN_NOTIFY, &info)
                .await
            {
                bus.respond_json(&msg, &InstanceResponse::err("ERR_BROADCAST_FAILED"))
                    .await;
                continue;
            }

            bus.respond_json(&msg, &InstanceResponse::ok()).await;
        }
    });
    Ok(())
}

async fn list_handler(bus: Bus, registry: Arc<ServerRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_LIST).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let response = ServerListResponse {
                servers: registry.get_all(),
            };
            bus.respond_json(&msg, &response).await;
        }
    });
    Ok(())
}

/// A proxy coming online asks for the current fleet and gets the bare
/// snapshot back.
async fn proxy_startup_handler(bus: Bus, registry: Arc<ServerRegistry>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_PROXY_STARTUP).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            bus.respond_json(&msg, &registry.get_all()).await;
        }
    });
    Ok(())
}
