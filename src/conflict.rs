//! Checkpoint conflict detection.
//!
//! Recent scans are kept in a sliding per-checkpoint window; when more than
//! one active driver shows up inside the window, an advisory report assigns
//! a departure order. The fairness policy sits behind a strategy trait: the
//! shipped policy orders by server receipt time, earliest first.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{ConflictEntry, ConflictReport, ScanEvent};

/// Assigns a departure order to concurrent drivers at one checkpoint.
pub trait ResolutionStrategy: Send + Sync {
    /// `entries` holds one element per distinct driver. Returns driver ids
    /// in their assigned order.
    fn resolve(&self, entries: &[ConflictEntry]) -> Vec<String>;
}

/// Earliest server receipt goes first.
#[derive(Debug, Default)]
pub struct ReceiptOrder;

impl ResolutionStrategy for ReceiptOrder {
    fn resolve(&self, entries: &[ConflictEntry]) -> Vec<String> {
        let mut ordered: Vec<&ConflictEntry> = entries.iter().collect();
        ordered.sort_by_key(|e| e.scanned_at);
        ordered.iter().map(|e| e.driver_id.clone()).collect()
    }
}

pub struct ConflictDetector {
    window: Duration,
    scans: RwLock<HashMap<String, Vec<ScanEvent>>>,
    strategy: Box<dyn ResolutionStrategy>,
}

impl ConflictDetector {
    pub fn new(window: Duration) -> Self {
        Self::with_strategy(window, Box::new(ReceiptOrder))
    }

    pub fn with_strategy(window: Duration, strategy: Box<dyn ResolutionStrategy>) -> Self {
        Self {
            window,
            scans: RwLock::new(HashMap::new()),
            strategy,
        }
    }

    /// Record an accepted scan and evaluate its checkpoint.
    ///
    /// Returns a report iff the window now holds scans from more than one
    /// distinct driver. A single driver's scans are a pure no-op.
    pub async fn record(&self, scan: ScanEvent) -> Option<ConflictReport> {
        let now = scan.received_at;
        let checkpoint_id = scan.checkpoint_id.clone();
        let mut scans = self.scans.write().await;
        let entry = scans.entry(checkpoint_id.clone()).or_default();
        entry.push(scan);
        Self::prune(entry, now, self.window);

        // Latest scan per distinct driver inside the window
        let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for scan in entry.iter() {
            let at = latest.entry(&scan.driver_id).or_insert(scan.received_at);
            if scan.received_at > *at {
                *at = scan.received_at;
            }
        }
        if latest.len() < 2 {
            return None;
        }

        let entries: Vec<ConflictEntry> = latest
            .into_iter()
            .map(|(driver_id, scanned_at)| ConflictEntry {
                driver_id: driver_id.to_string(),
                scanned_at,
            })
            .collect();
        let assigned_order = self.strategy.resolve(&entries);

        let mut drivers = entries;
        drivers.sort_by_key(|e| e.scanned_at);

        Some(ConflictReport {
            checkpoint_id,
            drivers,
            assigned_order,
            detected_at: now,
        })
    }

    fn prune(entry: &mut Vec<ScanEvent>, now: DateTime<Utc>, window: Duration) {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return;
        };
        entry.retain(|scan| now - scan.received_at <= window);
    }
}
