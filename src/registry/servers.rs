//! Registry of live game-server instances. Entries are created by
//! `servers.register`, refreshed by registration or a successful health
//! probe, and dropped on graceful shutdown or probe failure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bus::{Bus, Notifier, subjects};
use crate::metrics::Metrics;

/// A live game-server instance as announced on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub server_type: String,
    pub group: String,
    pub ip: String,
    pub port: u16,
    /// Stamped on registration and on every successful health probe.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

pub struct ServerRegistry {
    servers: DashMap<String, ServerInfo>,
    notifier: Notifier,
    metrics: Arc<Metrics>,
}

impl ServerRegistry {
    pub fn new(notifier: Notifier, metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            servers: DashMap::new(),
            notifier,
            metrics,
        })
    }

    /// Insert or overwrite a server entry, stamping `last_seen`.
    pub fn add_or_update(&self, mut info: ServerInfo) {
        info.last_seen = Some(Utc::now());
        info!(id = %info.id, server_type = %info.server_type, "registered server");
        self.servers.insert(info.id.clone(), info);
        self.metrics.registry_size.set(self.servers.len() as i64);
    }

    /// Drop a server entry. Missing ids are a no-op.
    pub fn remove(&self, id: &str) {
        if self.servers.remove(id).is_some() {
            info!(%id, "removed server");
        }
        self.metrics.registry_size.set(self.servers.len() as i64);
    }

    /// Snapshot of all current entries.
    pub fn get_all(&self) -> Vec<ServerInfo> {
        self.servers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Probe every registered server with a request-reply ping. Unresponsive
    /// servers are removed and the proxies notified; responsive ones get a
    /// fresh `last_seen`. The probe itself runs without any map lock held —
    /// request-reply must never block registry access.
    pub async fn health_check(&self, bus: &Bus, timeout: Duration) {
        let ids: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();

        for id in ids {
            let subject = format!("{}.{id}", subjects::HEALTH_CHECK);
            match bus.request_timeout(&subject, Bytes::new(), timeout).await {
                Ok(_) => {
                    if let Some(mut entry) = self.servers.get_mut(&id) {
                        entry.last_seen = Some(Utc::now());
                    }
                }
                Err(e) => {
                    warn!(%id, error = %e, "server unresponsive, removing from registry");
                    let Some((_, info)) = self.servers.remove(&id) else {
                        continue;
                    };
                    self.metrics.registry_size.set(self.servers.len() as i64);
                    self.notifier
                        .notify(subjects::SERVERS_PROXY_SHUTDOWN_NOTIFY, &info);
                }
            }
        }
    }
}
