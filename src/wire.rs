//! Relay wire protocol.
//!
//! Every inbound message is one tagged enum dispatched through a single
//! validation and routing pipeline, rather than one callback per event
//! name. Event tags follow the external contract (`driver-location-update`
//! and friends), payload fields are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Coordinates, DriverLocationRecord, DriverStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Passenger,
    Admin,
}

/// Optional driver details supplied at authentication time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jeepney_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub user_id: String,
    pub user_type: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_info: Option<DriverInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub driver_id: String,
    pub route_id: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jeepney_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub is_origin: bool,
    #[serde(default)]
    pub is_endpoint: bool,
    /// Advisory conflict annotation, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Value>,
}

impl LocationUpdate {
    pub fn into_record(self, updated_at: chrono::DateTime<chrono::Utc>) -> DriverLocationRecord {
        DriverLocationRecord {
            driver_id: self.driver_id,
            route_id: self.route_id,
            checkpoint_id: None,
            location: self.location,
            coordinates: self.coordinates,
            status: DriverStatus::Active,
            jeepney_number: self.jeepney_number,
            driver_name: self.driver_name,
            is_origin: self.is_origin,
            is_endpoint: self.is_endpoint,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStarted {
    pub trip_id: String,
    pub driver_id: String,
    pub route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCompleted {
    pub trip_id: String,
    pub driver_id: String,
    pub route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_id: Option<String>,
    pub earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrScan {
    pub driver_id: String,
    pub passenger_id: String,
    pub amount: f64,
    pub checkpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsUpdate {
    pub driver_id: String,
    pub amount: f64,
    pub total_earnings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerNotification {
    pub passenger_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatusUpdate {
    pub route_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Inbound messages a connected client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Authenticate(AuthRequest),
    DriverLocationUpdate(LocationUpdate),
    TripStarted(TripStarted),
    TripCompleted(TripCompleted),
    QrScan(QrScan),
    EarningsUpdate(EarningsUpdate),
    PassengerNotification(PassengerNotification),
    RouteStatusUpdate(RouteStatusUpdate),
}

impl ClientEvent {
    /// The only role allowed to emit this event. `Authenticate` is open to
    /// any unauthenticated session.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            ClientEvent::Authenticate(_) => None,
            ClientEvent::DriverLocationUpdate(_)
            | ClientEvent::TripStarted(_)
            | ClientEvent::TripCompleted(_)
            | ClientEvent::QrScan(_)
            | ClientEvent::EarningsUpdate(_) => Some(Role::Driver),
            ClientEvent::PassengerNotification(_) | ClientEvent::RouteStatusUpdate(_) => {
                Some(Role::Admin)
            }
        }
    }
}

/// Outbound messages the relay multicasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Authenticated {
        success: bool,
        #[serde(rename = "socketId")]
        socket_id: String,
        #[serde(rename = "connectedUsers")]
        connected_users: usize,
    },
    InitialDriverLocations(Vec<DriverLocationRecord>),
    DriverLocationUpdate(LocationUpdate),
    TripStarted(TripStarted),
    TripCompleted(TripCompleted),
    QrScanNotification(QrScan),
    EarningsUpdate(EarningsUpdate),
    Notification(PassengerNotification),
    RouteStatusUpdate(RouteStatusUpdate),
    DriverStatusUpdate {
        #[serde(rename = "driverId")]
        driver_id: String,
        status: DriverStatus,
    },
    /// Sent back when an inbound event cannot be accepted; the event
    /// itself is dropped, never echoed as a hard error.
    AckFailure {
        reason: String,
    },
}
