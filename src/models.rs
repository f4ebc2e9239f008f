//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use serde_helpers::*;

/// A fixed jeepney route: an ordered list of checkpoints.
///
/// Checkpoints are ordered by strictly increasing `sequence_order`;
/// the list is immutable while trips are running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub checkpoints: Vec<Checkpoint>,
    /// Expected travel minutes from a checkpoint (keyed by its
    /// `sequence_order`) to the next one. Sparse; missing legs fall back
    /// to the historical average.
    #[serde(default)]
    pub leg_minutes: std::collections::HashMap<u32, u32>,
}

impl Route {
    /// Checkpoint following `sequence_order` along the route, if any.
    pub fn next_checkpoint(&self, sequence_order: u32) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .filter(|c| c.sequence_order > sequence_order)
            .min_by_key(|c| c.sequence_order)
    }

    pub fn checkpoint(&self, checkpoint_id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == checkpoint_id)
    }
}

/// A named, sequence-ordered stop on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub route_id: String,
    pub sequence_order: u32,
    pub fare_from_origin: f64,
    #[serde(default)]
    pub is_origin: bool,
    #[serde(default)]
    pub is_destination: bool,
}

/// Checkpoint QR payload, produced by the external QR generator and
/// presented by a driver on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointQr {
    #[serde(rename = "type")]
    pub kind: String,
    pub checkpoint_id: String,
    #[serde(deserialize_with = "deserialize_trimmed")]
    pub checkpoint_name: String,
    pub route_id: String,
    #[serde(deserialize_with = "deserialize_trimmed")]
    pub route_name: String,
    pub sequence_order: u32,
    pub fare_from_origin: f64,
    #[serde(default)]
    pub is_origin: bool,
    #[serde(default)]
    pub is_destination: bool,
    pub generated_at: DateTime<Utc>,
}

/// A driver's report of passing a checkpoint. Never mutated; retained
/// only long enough to evaluate the conflict window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    pub driver_id: String,
    pub route_id: String,
    pub checkpoint_id: String,
    pub sequence_order: u32,
    /// Client-declared generation time from the QR payload.
    pub generated_at: DateTime<Utc>,
    /// Server receipt time; the conflict resolution key.
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Active,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Latest known state for one driver. Replace-on-write; the live-presence
/// record behind passenger queries and the initial-state sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationRecord {
    pub driver_id: String,
    pub route_id: String,
    pub checkpoint_id: Option<String>,
    /// Human-readable current location, e.g. the checkpoint name.
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub status: DriverStatus,
    pub jeepney_number: Option<String>,
    pub driver_name: Option<String>,
    #[serde(default)]
    pub is_origin: bool,
    #[serde(default)]
    pub is_endpoint: bool,
    pub updated_at: DateTime<Utc>,
}

/// One driver's entry in a conflict report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictEntry {
    pub driver_id: String,
    pub scanned_at: DateTime<Utc>,
}

/// Advisory report produced when several drivers share a checkpoint
/// within the conflict window. Never blocks the originating scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub checkpoint_id: String,
    pub drivers: Vec<ConflictEntry>,
    /// Resolution: driver ids in their assigned departure order.
    pub assigned_order: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionFilter {
    /// Every checkpoint arrival on the route.
    #[default]
    All,
    /// Only arrivals at the named checkpoint.
    Checkpoint,
}

/// A passenger's interest in a route (or one checkpoint on it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub passenger_id: String,
    pub route_id: String,
    pub checkpoint_id: Option<String>,
    #[serde(default)]
    pub filter: SubscriptionFilter,
}

impl Subscription {
    /// Whether an arrival at `checkpoint_id` on `route_id` matches.
    pub fn matches(&self, route_id: &str, checkpoint_id: &str) -> bool {
        if self.route_id != route_id {
            return false;
        }
        match self.filter {
            SubscriptionFilter::All => true,
            SubscriptionFilter::Checkpoint => {
                self.checkpoint_id.as_deref() == Some(checkpoint_id)
            }
        }
    }
}

/// Driver/checkpoint/ETA summary delivered to one passenger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub driver_id: String,
    pub route_id: String,
    pub checkpoint_name: String,
    pub eta: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize_trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Ok(s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_checkpoint_qr() {
        let s = r#"{
          "type": "checkpoint",
          "checkpoint_id": "cp-2",
          "checkpoint_name": " Crossing Bayabas ",
          "route_id": "r1",
          "route_name": "Toril - Roxas",
          "sequence_order": 2,
          "fare_from_origin": 15.5,
          "is_origin": false,
          "is_destination": false,
          "generated_at": "2025-06-01T08:30:00Z"
        }"#;
        let qr: CheckpointQr = serde_json::from_str(s).unwrap();

        assert_eq!(qr.kind, "checkpoint");
        assert_eq!(qr.checkpoint_id, "cp-2");
        assert_eq!(qr.checkpoint_name, "Crossing Bayabas");
        assert_eq!(qr.route_id, "r1");
        assert_eq!(qr.sequence_order, 2);
        assert_eq!(qr.fare_from_origin, 15.5);
        assert!(!qr.is_origin);
        assert!(!qr.is_destination);
    }

    #[test]
    fn parse_checkpoint_qr_flag_defaults() {
        let s = r#"{
          "type": "checkpoint",
          "checkpoint_id": "cp-1",
          "checkpoint_name": "Toril Terminal",
          "route_id": "r1",
          "route_name": "Toril - Roxas",
          "sequence_order": 1,
          "fare_from_origin": 0.0,
          "generated_at": "2025-06-01T08:00:00Z"
        }"#;
        let qr: CheckpointQr = serde_json::from_str(s).unwrap();

        assert!(!qr.is_origin);
        assert!(!qr.is_destination);
    }

    #[test]
    fn next_checkpoint_skips_gaps() {
        let route = Route {
            id: "r1".into(),
            name: "Toril - Roxas".into(),
            checkpoints: vec![
                checkpoint("cp-1", 1),
                checkpoint("cp-3", 3),
                checkpoint("cp-7", 7),
            ],
            leg_minutes: Default::default(),
        };

        assert_eq!(route.next_checkpoint(1).unwrap().id, "cp-3");
        assert_eq!(route.next_checkpoint(3).unwrap().id, "cp-7");
        assert_eq!(route.next_checkpoint(7), None);
    }

    #[test]
    fn subscription_matching() {
        let all = Subscription {
            passenger_id: "p1".into(),
            route_id: "r1".into(),
            checkpoint_id: None,
            filter: SubscriptionFilter::All,
        };
        assert!(all.matches("r1", "cp-2"));
        assert!(!all.matches("r2", "cp-2"));

        let narrow = Subscription {
            passenger_id: "p1".into(),
            route_id: "r1".into(),
            checkpoint_id: Some("cp-2".into()),
            filter: SubscriptionFilter::Checkpoint,
        };
        assert!(narrow.matches("r1", "cp-2"));
        assert!(!narrow.matches("r1", "cp-3"));
    }

    fn checkpoint(id: &str, seq: u32) -> Checkpoint {
        Checkpoint {
            id: id.into(),
            name: id.to_uppercase(),
            route_id: "r1".into(),
            sequence_order: seq,
            fare_from_origin: 0.0,
            is_origin: seq == 1,
            is_destination: false,
        }
    }
}
