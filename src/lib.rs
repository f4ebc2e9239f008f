//! Jeepney checkpoint tracking and notification fan-out.

pub mod api;
pub mod bridge;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod models;
pub mod relay;
pub mod rooms;
pub mod routes;
pub mod scan;
pub mod state;
pub mod subscriptions;
pub mod wire;

use std::sync::Arc;

use crate::api::ApiState;
use crate::bridge::NotificationSink;
use crate::config::TrackingConfig;
use crate::conflict::ConflictDetector;
use crate::relay::RelayHandle;
use crate::routes::RouteRegistry;
use crate::scan::ScanPipeline;
use crate::state::LocationStore;
use crate::subscriptions::{NotificationHistory, SubscriptionIndex};

/// Wire the stores, pipeline and relay handle together. The registry and
/// sink are injectable so tests can seed routes and stub out delivery.
pub fn build_state(
    tracking: &TrackingConfig,
    registry: RouteRegistry,
    sink: Arc<dyn NotificationSink>,
) -> ApiState {
    let relay = RelayHandle::new(Arc::new(LocationStore::new()));
    let subscriptions = Arc::new(SubscriptionIndex::new());
    let history = Arc::new(NotificationHistory::new(tracking.notification_history));
    let pipeline = Arc::new(ScanPipeline::new(
        Arc::new(registry),
        Arc::new(ConflictDetector::new(tracking.conflict_window)),
        Arc::clone(&subscriptions),
        Arc::clone(&history),
        sink,
        tracking.replay_window,
        tracking.default_leg_minutes,
    ));
    ApiState {
        relay,
        pipeline,
        subscriptions,
        history,
    }
}
