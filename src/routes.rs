//! Route and assignment lookups.
//!
//! Routes, their ordered checkpoints and driver↔route assignments are
//! owned by an external fleet-management system; this registry only holds
//! the read-side the scan pipeline needs, seeded once at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::errors::TrackerError;
use crate::models::Route;

/// Seed file format: routes plus a driver-id → route-id assignment map.
#[derive(Debug, Deserialize)]
pub struct RouteSeed {
    pub routes: Vec<Route>,
    #[serde(default)]
    pub assignments: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<String, Route>,
    assignments: HashMap<String, String>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, TrackerError> {
        let raw = std::fs::read_to_string(path)?;
        let seed: RouteSeed = serde_json::from_str(&raw)?;
        let mut registry = Self::new();
        for route in seed.routes {
            registry.insert_route(route);
        }
        for (driver, route) in seed.assignments {
            registry.assign_driver(&driver, &route);
        }
        info!(
            routes = registry.routes.len(),
            assignments = registry.assignments.len(),
            "Route registry seeded from {}",
            path.display()
        );
        Ok(registry)
    }

    pub fn insert_route(&mut self, mut route: Route) {
        route
            .checkpoints
            .sort_by_key(|checkpoint| checkpoint.sequence_order);
        self.routes.insert(route.id.clone(), route);
    }

    pub fn assign_driver(&mut self, driver_id: &str, route_id: &str) {
        self.assignments
            .insert(driver_id.to_string(), route_id.to_string());
    }

    pub fn route(&self, route_id: &str) -> Result<&Route, TrackerError> {
        self.routes
            .get(route_id)
            .ok_or_else(|| TrackerError::UnknownRoute(route_id.to_string()))
    }

    /// Route id the driver is assigned to.
    pub fn assigned_route(&self, driver_id: &str) -> Result<&str, TrackerError> {
        self.assignments
            .get(driver_id)
            .map(String::as_str)
            .ok_or_else(|| TrackerError::UnknownDriver(driver_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn seed_from_file() {
        let raw = r#"{
            "routes": [{
                "id": "r1",
                "name": "Toril - Roxas",
                "checkpoints": [
                    {
                        "id": "cp-2", "name": "Crossing Bayabas", "route_id": "r1",
                        "sequence_order": 2, "fare_from_origin": 12.0
                    },
                    {
                        "id": "cp-1", "name": "Toril Terminal", "route_id": "r1",
                        "sequence_order": 1, "fare_from_origin": 0.0, "is_origin": true
                    }
                ],
                "leg_minutes": {"1": 7}
            }],
            "assignments": {"d1": "r1"}
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(raw.as_bytes()).unwrap();

        let registry = RouteRegistry::from_file(file.path()).unwrap();
        let route = registry.route("r1").unwrap();

        // Checkpoints come back ordered regardless of seed order
        assert_eq!(route.checkpoints[0].id, "cp-1");
        assert_eq!(route.checkpoints[1].id, "cp-2");
        assert_eq!(route.leg_minutes.get(&1), Some(&7));
        assert_eq!(registry.assigned_route("d1").unwrap(), "r1");
        assert!(registry.assigned_route("d9").is_err());
        assert!(registry.route("r9").is_err());
    }
}
