//! Delivery bridge: one-way push from the backend into the relay ingress.
//!
//! The live channel is a convenience path, not a correctness path. Every
//! push runs with bounded timeouts and every failure is logged and
//! swallowed; the operation that triggered the push has already committed
//! and is never unwound.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::errors::TrackerError;
use crate::models::{ConflictReport, DriverLocationRecord};

/// Events the backend pushes into the relay.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    DriverLocation {
        record: DriverLocationRecord,
        conflict: Option<ConflictReport>,
    },
    TripCompleted {
        trip_id: String,
        driver_id: String,
        route_id: String,
        passenger_id: Option<String>,
        earnings: f64,
    },
    QrScan {
        driver_id: String,
        passenger_id: String,
        amount: f64,
        checkpoint: String,
        trip_id: Option<String>,
    },
    EarningsUpdate {
        driver_id: String,
        amount: f64,
        total_earnings: f64,
        trip_count: Option<u32>,
    },
    TripStarted {
        trip_id: String,
        driver_id: String,
        route_id: String,
        passenger_id: Option<String>,
    },
    RouteStatus {
        route_id: String,
        status: String,
        message: Option<String>,
    },
    PassengerNotification {
        passenger_id: String,
        title: Option<String>,
        message: String,
    },
}

impl BridgeEvent {
    /// Ingress path the event is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            BridgeEvent::DriverLocation { .. } => "/api/driver-location",
            BridgeEvent::TripCompleted { .. } => "/api/trip-completed",
            BridgeEvent::QrScan { .. } => "/api/qr-scan",
            BridgeEvent::EarningsUpdate { .. } => "/api/earnings-update",
            BridgeEvent::TripStarted { .. } => "/api/trip-started",
            BridgeEvent::RouteStatus { .. } => "/api/route-status",
            BridgeEvent::PassengerNotification { .. } => "/api/passenger-notification",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            BridgeEvent::DriverLocation { record, conflict } => {
                let mut payload = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
                if let Some(conflict) = conflict {
                    payload["conflict"] =
                        serde_json::to_value(conflict).unwrap_or_else(|_| json!({}));
                }
                payload
            }
            BridgeEvent::TripCompleted {
                trip_id,
                driver_id,
                route_id,
                passenger_id,
                earnings,
            } => json!({
                "tripId": trip_id,
                "driverId": driver_id,
                "routeId": route_id,
                "passengerId": passenger_id,
                "earnings": earnings,
            }),
            BridgeEvent::QrScan {
                driver_id,
                passenger_id,
                amount,
                checkpoint,
                trip_id,
            } => json!({
                "driverId": driver_id,
                "passengerId": passenger_id,
                "amount": amount,
                "checkpoint": checkpoint,
                "tripId": trip_id,
            }),
            BridgeEvent::EarningsUpdate {
                driver_id,
                amount,
                total_earnings,
                trip_count,
            } => json!({
                "driverId": driver_id,
                "amount": amount,
                "totalEarnings": total_earnings,
                "tripCount": trip_count,
            }),
            BridgeEvent::TripStarted {
                trip_id,
                driver_id,
                route_id,
                passenger_id,
            } => json!({
                "tripId": trip_id,
                "driverId": driver_id,
                "routeId": route_id,
                "passengerId": passenger_id,
            }),
            BridgeEvent::RouteStatus {
                route_id,
                status,
                message,
            } => json!({
                "routeId": route_id,
                "status": status,
                "message": message,
            }),
            BridgeEvent::PassengerNotification {
                passenger_id,
                title,
                message,
            } => json!({
                "passengerId": passenger_id,
                "title": title,
                "message": message,
            }),
        }
    }
}

/// Outcome of a push, for logs and tests. Failure is data, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Push one event. Must never propagate a failure to the caller.
    async fn push(&self, event: BridgeEvent) -> DeliveryStatus;

    /// Reachability probe for operational diagnostics only; does not gate
    /// normal traffic.
    async fn probe(&self) -> bool;
}

/// HTTP pusher with bounded connect and total timeouts.
pub struct HttpDeliveryBridge {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDeliveryBridge {
    pub fn new(config: &BridgeConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for HttpDeliveryBridge {
    async fn push(&self, event: BridgeEvent) -> DeliveryStatus {
        let endpoint = event.endpoint();
        let url = format!("{}{}", self.base_url, endpoint);
        match self.client.post(&url).json(&event.payload()).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(endpoint, "Relay delivery ok");
                DeliveryStatus::Delivered
            }
            Ok(response) => {
                warn!(endpoint, status = %response.status(), "Relay rejected delivery");
                DeliveryStatus::Failed
            }
            Err(e) => {
                warn!(endpoint, "Relay unreachable: {}", e);
                DeliveryStatus::Failed
            }
        }
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Sink that drops everything; used in tests and when no relay is wired up.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn push(&self, _event: BridgeEvent) -> DeliveryStatus {
        DeliveryStatus::Delivered
    }

    async fn probe(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_bridge() -> HttpDeliveryBridge {
        // Reserved TEST-NET-1 address; nothing listens there
        HttpDeliveryBridge::new(&BridgeConfig {
            base_url: "http://192.0.2.1:9".to_string(),
            connect_timeout: Duration::from_millis(200),
            timeout: Duration::from_millis(400),
        })
        .unwrap()
    }

    #[test]
    fn endpoint_per_event() {
        let event = BridgeEvent::EarningsUpdate {
            driver_id: "d1".into(),
            amount: 15.0,
            total_earnings: 450.0,
            trip_count: Some(12),
        };
        assert_eq!(event.endpoint(), "/api/earnings-update");
        assert_eq!(event.payload()["totalEarnings"], 450.0);
    }

    #[tokio::test]
    async fn unreachable_relay_is_swallowed() {
        let bridge = unreachable_bridge();
        let status = bridge
            .push(BridgeEvent::QrScan {
                driver_id: "d1".into(),
                passenger_id: "p1".into(),
                amount: 12.0,
                checkpoint: "Crossing Bayabas".into(),
                trip_id: None,
            })
            .await;
        assert_eq!(status, DeliveryStatus::Failed);
        assert!(!bridge.probe().await);
    }
}
