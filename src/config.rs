use std::path::Path;

use serde::Deserialize;
use tracing::info;

/// Top-level service configuration, loaded from nexus.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub bus: BusSection,
    pub metrics: MetricsSection,
    pub orchestrator: OrchestratorSection,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct BusSection {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
    /// Environment tag prepended to every subject (e.g. "dev", "prod").
    /// Empty means no prefixing.
    pub subject_prefix: String,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            hostname: "127.0.0.1".into(),
            port: 4222,
            subject_prefix: String::new(),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct MetricsSection {
    pub address: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8081".into(),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorSection {
    pub address: String,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".into(),
        }
    }
}

impl ServiceConfig {
    /// Load config from a TOML file. Falls back to defaults if the file
    /// doesn't exist. Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {path}: {e}"));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {path}: {e}"))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NATS_USERNAME") {
            self.bus.username = v;
        }
        if let Ok(v) = std::env::var("NATS_PASSWORD") {
            self.bus.password = v;
        }
        if let Ok(v) = std::env::var("NATS_HOSTNAME") {
            self.bus.hostname = v;
        }
        if let Ok(v) = std::env::var("NATS_PORT")
            && let Ok(port) = v.parse()
        {
            self.bus.port = port;
        }
        if let Ok(v) = std::env::var("NATS_SUBJECT_PREFIX") {
            self.bus.subject_prefix = v;
        }
        if let Ok(v) = std::env::var("METRICS_ADDRESS") {
            self.metrics.address = v;
        }
        if let Ok(v) = std::env::var("NOMAD_ADDR") {
            self.orchestrator.address = v;
        }
    }
}
