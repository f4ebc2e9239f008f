//! Checkpoint scan validation and ETA estimation.
//!
//! A scan is validated against the route's checkpoint sequence before any
//! state changes: wrong route and backward sequence are rejected, a re-scan
//! of the same checkpoint inside the replay window is an idempotent no-op.
//! Accepted scans feed the conflict window, notify matching subscribers and
//! fire a location update through the delivery bridge; the bridge push runs
//! off the critical path and can never fail the scan.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::bridge::{BridgeEvent, NotificationSink};
use crate::conflict::ConflictDetector;
use crate::errors::TrackerError;
use crate::models::{
    CheckpointQr, ConflictReport, DriverLocationRecord, DriverStatus, ScanEvent,
};
use crate::routes::RouteRegistry;
use crate::subscriptions::{NotificationHistory, SubscriptionIndex};

/// Result of an accepted scan, returned to the driver's device.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub checkpoint_name: String,
    pub fare_from_origin: f64,
    pub eta: String,
    pub conflict: Option<ConflictReport>,
    pub passengers_notified: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Accepted(Box<ScanSummary>),
    /// Same checkpoint re-scanned within the replay window; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone)]
struct LastScan {
    sequence: u32,
    checkpoint_id: String,
    at: DateTime<Utc>,
}

/// ETA to the next checkpoint: route timing table first, then the
/// historical per-route leg average, then the configured default.
pub struct EtaEstimator {
    default_minutes: u32,
    observed: RwLock<HashMap<String, (u64, u32)>>,
}

impl EtaEstimator {
    pub fn new(default_minutes: u32) -> Self {
        Self {
            default_minutes,
            observed: RwLock::new(HashMap::new()),
        }
    }

    /// Record an observed leg duration for the route's historical average.
    pub async fn record_leg(&self, route_id: &str, duration: Duration) {
        let mut observed = self.observed.write().await;
        let (sum, count) = observed.entry(route_id.to_string()).or_insert((0, 0));
        *sum += duration.as_secs();
        *count += 1;
    }

    /// Minutes to the checkpoint following `sequence_order`.
    pub async fn estimate(
        &self,
        registry: &RouteRegistry,
        route_id: &str,
        sequence_order: u32,
    ) -> Result<String, TrackerError> {
        let route = registry.route(route_id)?;
        if route.next_checkpoint(sequence_order).is_none() {
            return Ok("terminus".to_string());
        }
        if let Some(minutes) = route.leg_minutes.get(&sequence_order) {
            return Ok(format!("~{} min", minutes));
        }
        let observed = self.observed.read().await;
        if let Some((sum, count)) = observed.get(route_id) {
            if *count > 0 {
                let minutes = (sum / *count as u64 + 59) / 60;
                return Ok(format!("~{} min", minutes.max(1)));
            }
        }
        Ok(format!("~{} min", self.default_minutes))
    }
}

pub struct ScanPipeline {
    registry: Arc<RouteRegistry>,
    detector: Arc<ConflictDetector>,
    subscriptions: Arc<SubscriptionIndex>,
    history: Arc<NotificationHistory>,
    sink: Arc<dyn NotificationSink>,
    eta: EtaEstimator,
    replay_window: Duration,
    ledger: RwLock<HashMap<(String, String), LastScan>>,
}

impl ScanPipeline {
    pub fn new(
        registry: Arc<RouteRegistry>,
        detector: Arc<ConflictDetector>,
        subscriptions: Arc<SubscriptionIndex>,
        history: Arc<NotificationHistory>,
        sink: Arc<dyn NotificationSink>,
        replay_window: Duration,
        default_leg_minutes: u32,
    ) -> Self {
        Self {
            registry,
            detector,
            subscriptions,
            history,
            sink,
            eta: EtaEstimator::new(default_leg_minutes),
            replay_window,
            ledger: RwLock::new(HashMap::new()),
        }
    }

    pub async fn process(
        &self,
        driver_id: &str,
        qr: &CheckpointQr,
    ) -> Result<ScanOutcome, TrackerError> {
        self.process_at(driver_id, qr, Utc::now()).await
    }

    async fn process_at(
        &self,
        driver_id: &str,
        qr: &CheckpointQr,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, TrackerError> {
        let assigned_route = self.registry.assigned_route(driver_id)?;
        if qr.route_id != assigned_route {
            return Err(TrackerError::RouteMismatch {
                payload_route: qr.route_id.clone(),
                assigned_route: assigned_route.to_string(),
            });
        }
        let route = self.registry.route(&qr.route_id)?;
        let checkpoint = route
            .checkpoint(&qr.checkpoint_id)
            .ok_or_else(|| TrackerError::UnknownCheckpoint(qr.checkpoint_id.clone()))?;

        let key = (driver_id.to_string(), qr.route_id.clone());
        let mut observed_leg = None;
        {
            let ledger = self.ledger.read().await;
            if let Some(last) = ledger.get(&key) {
                let elapsed = (now - last.at).to_std().unwrap_or_default();
                if last.checkpoint_id == qr.checkpoint_id && elapsed <= self.replay_window {
                    info!(driver_id, checkpoint = %qr.checkpoint_id, "Duplicate scan ignored");
                    return Ok(ScanOutcome::Duplicate);
                }
                // Scanning the origin checkpoint starts a new trip and
                // resets the sequence tracking for this route.
                if qr.sequence_order <= last.sequence && !checkpoint.is_origin {
                    return Err(TrackerError::OutOfSequenceScan {
                        scanned: qr.sequence_order,
                        last_accepted: last.sequence,
                    });
                }
                if qr.sequence_order > last.sequence {
                    observed_leg = Some(elapsed);
                }
            }
        }

        self.ledger.write().await.insert(
            key,
            LastScan {
                sequence: qr.sequence_order,
                checkpoint_id: qr.checkpoint_id.clone(),
                at: now,
            },
        );
        if let Some(leg) = observed_leg {
            self.eta.record_leg(&qr.route_id, leg).await;
        }

        let scan = ScanEvent {
            driver_id: driver_id.to_string(),
            route_id: qr.route_id.clone(),
            checkpoint_id: qr.checkpoint_id.clone(),
            sequence_order: qr.sequence_order,
            generated_at: qr.generated_at,
            received_at: now,
        };
        let conflict = self.detector.record(scan).await;
        if let Some(conflict) = &conflict {
            warn!(
                checkpoint = %conflict.checkpoint_id,
                drivers = conflict.drivers.len(),
                "Concurrent drivers at checkpoint"
            );
        }

        let eta = self
            .eta
            .estimate(&self.registry, &qr.route_id, qr.sequence_order)
            .await?;

        let recipients = self
            .subscriptions
            .matching(&qr.route_id, &qr.checkpoint_id)
            .await;
        for recipient in &recipients {
            self.history
                .append(recipient, driver_id, &qr.route_id, &qr.checkpoint_name, &eta)
                .await;
        }

        let record = DriverLocationRecord {
            driver_id: driver_id.to_string(),
            route_id: qr.route_id.clone(),
            checkpoint_id: Some(qr.checkpoint_id.clone()),
            location: qr.checkpoint_name.clone(),
            coordinates: None,
            status: DriverStatus::Active,
            jeepney_number: None,
            driver_name: None,
            is_origin: qr.is_origin,
            is_endpoint: qr.is_destination,
            updated_at: now,
        };
        let event = BridgeEvent::DriverLocation {
            record,
            conflict: conflict.clone(),
        };
        let sink = Arc::clone(&self.sink);
        // Fire and forget: scan latency never couples to relay availability
        tokio::spawn(async move {
            sink.push(event).await;
        });

        info!(
            driver_id,
            checkpoint = %qr.checkpoint_name,
            sequence = qr.sequence_order,
            notified = recipients.len(),
            "Scan accepted"
        );

        Ok(ScanOutcome::Accepted(Box::new(ScanSummary {
            checkpoint_name: qr.checkpoint_name.clone(),
            fare_from_origin: checkpoint.fare_from_origin,
            eta,
            conflict,
            passengers_notified: recipients.len(),
        })))
    }
}
