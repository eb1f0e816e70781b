//! Prometheus metrics for the coordination service, served at `/metrics`.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::{error, info};

/// Owns the Prometheus registry and the metric families. Built once in main
/// and passed by reference; no process-wide statics.
pub struct Metrics {
    registry: Registry,
    /// Number of active servers in the registry.
    pub registry_size: IntGauge,
    /// Total server registration requests, labeled by outcome.
    pub registration_requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        let registry = Registry::new();

        let registry_size = IntGauge::new(
            "server_registry_size",
            "Number of active servers in the registry",
        )
        .expect("valid gauge definition");

        let registration_requests = IntCounterVec::new(
            Opts::new(
                "server_registration_requests_total",
                "Total number of server registration requests received",
            ),
            &["status"],
        )
        .expect("valid counter definition");

        registry
            .register(Box::new(registry_size.clone()))
            .expect("gauge registers once");
        registry
            .register(Box::new(registration_requests.clone()))
            .expect("counter registers once");

        Arc::new(Self {
            registry,
            registry_size,
            registration_requests,
        })
    }

    /// Encode the current metric families in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

async fn serve_metrics(State(metrics): State<Arc<Metrics>>) -> Result<String, StatusCode> {
    metrics.encode_text().map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Bind the metrics endpoint and serve it until the process exits.
pub async fn serve(address: String, metrics: Arc<Metrics>) {
    let app = Router::new()
        .route("/metrics", axum::routing::get(serve_metrics))
        .with_state(metrics);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%address, error = %e, "failed to bind metrics listener");
            return;
        }
    };

    info!(%address, "metrics endpoint up");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "metrics server error");
    }
}
