//! Thin wrapper around the NATS connection: subject prefixing, request-reply
//! with an explicit timeout, and the non-blocking notification queue that
//! registries publish through.

pub mod subjects;

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::BusSection;

/// Shared handle to the bus. Cheap to clone; all components hold one.
#[derive(Clone)]
pub struct Bus {
    client: async_nats::Client,
    prefix: String,
}

impl Bus {
    /// Connect using the configured credentials. Fatal on failure — nothing
    /// in this service works without the bus.
    pub async fn connect(cfg: &BusSection) -> anyhow::Result<Self> {
        let url = format!("nats://{}:{}", cfg.hostname, cfg.port);
        let client = async_nats::ConnectOptions::new()
            .user_and_password(cfg.username.clone(), cfg.password.clone())
            .connect(&url)
            .await
            .with_context(|| format!("connecting to NATS at {url}"))?;

        info!(%url, prefix = %cfg.subject_prefix, "connected to NATS");

        Ok(Self {
            client,
            prefix: cfg.subject_prefix.clone(),
        })
    }

    pub fn prefixed(&self, subject: &str) -> String {
        subjects::ensure_prefixed(&self.prefix, subject)
    }

    /// Strip the environment tag from an inbound subject for segment parsing.
    pub fn strip<'a>(&self, subject: &'a str) -> &'a str {
        subjects::strip_prefix(&self.prefix, subject)
    }

    /// Subscribe to a (possibly wildcard) subject. Failures here are treated
    /// as fatal by the callers — a handler that never subscribes is a dead
    /// service.
    pub async fn subscribe(&self, subject: &str) -> anyhow::Result<async_nats::Subscriber> {
        let prefixed = self.prefixed(subject);
        let sub = self
            .client
            .subscribe(prefixed.clone())
            .await
            .with_context(|| format!("subscribing to {prefixed}"))?;
        info!(subject = %prefixed, "listening");
        Ok(sub)
    }

    pub async fn publish(&self, subject: &str, payload: Bytes) {
        let prefixed = self.prefixed(subject);
        if let Err(e) = self.client.publish(prefixed.clone(), payload).await {
            warn!(subject = %prefixed, error = %e, "publish failed");
        }
    }

    /// Serialize and publish. Returns false on serialization or send failure
    /// so callers can surface a broadcast error without rolling back.
    pub async fn publish_json<T: Serialize>(&self, subject: &str, payload: &T) -> bool {
        let data = match serde_json::to_vec(payload) {
            Ok(data) => data,
            Err(e) => {
                error!(%subject, error = %e, "failed to serialize payload");
                return false;
            }
        };
        let prefixed = self.prefixed(subject);
        if let Err(e) = self.client.publish(prefixed.clone(), data.into()).await {
            warn!(subject = %prefixed, error = %e, "publish failed");
            return false;
        }
        true
    }

    /// Request-reply with an explicit deadline. Used by the health checker;
    /// never call this while holding a registry lock.
    pub async fn request_timeout(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> anyhow::Result<async_nats::Message> {
        let prefixed = self.prefixed(subject);
        let reply = tokio::time::timeout(timeout, self.client.request(prefixed.clone(), payload))
            .await
            .with_context(|| format!("request to {prefixed} timed out"))??;
        Ok(reply)
    }

    /// Reply to a request message, if the sender expects one.
    pub async fn respond(&self, msg: &async_nats::Message, payload: Vec<u8>) {
        let Some(reply) = msg.reply.clone() else {
            return;
        };
        if let Err(e) = self.client.publish(reply, payload.into()).await {
            warn!(subject = %msg.subject, error = %e, "failed to send reply");
        }
    }

    /// Serialize and reply. Serialization of our own reply types cannot
    /// realistically fail; it is logged if it ever does.
    pub async fn respond_json<T: Serialize>(&self, msg: &async_nats::Message, payload: &T) {
        match serde_json::to_vec(payload) {
            Ok(data) => self.respond(msg, data).await,
            Err(e) => error!(subject = %msg.subject, error = %e, "failed to serialize reply"),
        }
    }

    /// Spawn the publisher task draining the notification queue into the bus
    /// and return the sending handle for the registries.
    pub fn notifier(&self) -> Notifier {
        let (notifier, mut rx) = Notifier::channel(self.prefix.clone());
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                if let Err(e) = client.publish(out.subject.clone(), out.payload).await {
                    warn!(subject = %out.subject, error = %e, "notification publish failed");
                }
            }
        });
        notifier
    }
}

/// One queued notification: an already-prefixed subject and its JSON body.
#[derive(Debug)]
pub struct Outbound {
    pub subject: String,
    pub payload: Bytes,
}

/// Fire-and-forget notification handle. Enqueueing never blocks, so
/// registries may notify while holding their lock; the publisher task owns
/// the actual sends. Tests construct one over a bare channel and read the
/// queue directly.
#[derive(Clone)]
pub struct Notifier {
    prefix: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Notifier {
    pub fn channel(prefix: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                prefix: prefix.into(),
                tx,
            },
            rx,
        )
    }

    /// Enqueue a notification. Returns false if the payload could not be
    /// serialized or the publisher task is gone; the mutation that produced
    /// it is never rolled back.
    pub fn notify<T: Serialize>(&self, subject: &str, payload: &T) -> bool {
        let data = match serde_json::to_vec(payload) {
            Ok(data) => data,
            Err(e) => {
                error!(%subject, error = %e, "failed to serialize notification");
                return false;
            }
        };
        let out = Outbound {
            subject: subjects::ensure_prefixed(&self.prefix, subject),
            payload: data.into(),
        };
        if self.tx.send(out).is_err() {
            error!(%subject, "notification queue closed");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn notifier_applies_prefix_and_queues() {
        let (notifier, mut rx) = Notifier::channel("dev");
        assert!(notifier.notify("party.join.notify", &json!({"x": 1})));

        let out = rx.try_recv().unwrap();
        assert_eq!(out.subject, "dev.party.join.notify");
        let body: serde_json::Value = serde_json::from_slice(&out.payload).unwrap();
        assert_eq!(body["x"], 1);
    }

    #[test]
    fn notifier_reports_closed_queue() {
        let (notifier, rx) = Notifier::channel("");
        drop(rx);
        assert!(!notifier.notify("party.join.notify", &json!({})));
    }
}
