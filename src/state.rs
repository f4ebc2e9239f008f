//! Ephemeral location and status state.
//!
//! A process-local live-presence cache, not a record of history. Restarts
//! clear it; trip and earnings history live in an external ledger.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::{DriverLocationRecord, DriverStatus};

/// Latest known record per driver, replace-on-write.
#[derive(Debug, Default)]
pub struct LocationStore {
    records: RwLock<HashMap<String, DriverLocationRecord>>,
}

impl LocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the driver's record. No merge semantics.
    pub async fn upsert(&self, record: DriverLocationRecord) {
        let mut records = self.records.write().await;
        records.insert(record.driver_id.clone(), record);
    }

    /// Flip the driver's record to offline and stamp last-seen. No-op for
    /// drivers that never reported a location.
    pub async fn mark_offline(&self, driver_id: &str) -> Option<DriverLocationRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(driver_id)?;
        record.status = DriverStatus::Offline;
        record.updated_at = Utc::now();
        info!(driver_id, "Driver marked offline");
        Some(record.clone())
    }

    /// Active records on one route; seeds the initial-state sync and
    /// answers "current drivers on this route".
    pub async fn snapshot(&self, route_id: &str) -> Vec<DriverLocationRecord> {
        let records = self.records.read().await;
        let mut active: Vec<_> = records
            .values()
            .filter(|r| r.route_id == route_id && r.status == DriverStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        active
    }

    pub async fn get(&self, driver_id: &str) -> Option<DriverLocationRecord> {
        self.records.read().await.get(driver_id).cloned()
    }

    /// Count of active records, for the health endpoint.
    pub async fn active_count(&self) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.status == DriverStatus::Active)
            .count()
    }
}
