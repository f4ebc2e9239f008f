//! Errors for the jeepney tracker
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("websocket error")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("relay delivery failed")]
    DeliveryError(#[from] reqwest::Error),

    #[error("QR payload is for route {payload_route}, driver is assigned to {assigned_route}")]
    RouteMismatch {
        payload_route: String,
        assigned_route: String,
    },

    #[error("scan at sequence {scanned} is behind last accepted sequence {last_accepted}")]
    OutOfSequenceScan { scanned: u32, last_accepted: u32 },

    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("unknown checkpoint: {0}")]
    UnknownCheckpoint(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),
}
