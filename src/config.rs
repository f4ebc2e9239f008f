//! Application configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub relay: RelayConfig,
    pub bridge: BridgeConfig,
    pub tracking: TrackingConfig,
}

/// Backend HTTP surface: scan ingest, subscriptions, bridge ingress, health.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: SocketAddr,
}

/// Websocket relay listener.
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
}

/// Fire-and-forget push from the backend into the relay ingress.
#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Base URL of the relay ingress, e.g. `http://127.0.0.1:9100`.
    pub base_url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub connect_timeout: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Re-scans of the same checkpoint inside this window are idempotent.
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub replay_window: Duration,
    /// Scans from distinct drivers inside this window count as concurrent.
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub conflict_window: Duration,
    /// Maximum notifications retained per passenger.
    pub notification_history: usize,
    /// ETA fallback when neither timing table nor history has an answer.
    pub default_leg_minutes: u32,
    /// Optional JSON file seeding routes and driver assignments.
    pub routes_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("JEEPNEY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            replay_window: Duration::from_secs(60),
            conflict_window: Duration::from_secs(120),
            notification_history: 100,
            default_leg_minutes: 10,
            routes_file: None,
        }
    }
}
