//! Backend HTTP surface.
//!
//! Scan ingest and the subscription API for the backend side, the bridge
//! ingress endpoints for the relay side, and `/health`. Scan rejections
//! are surfaced synchronously with a descriptive reason; everything past a
//! committed scan is best-effort and never unwinds it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::errors::TrackerError;
use crate::models::{CheckpointQr, Subscription};
use crate::relay::RelayHandle;
use crate::scan::{ScanOutcome, ScanPipeline};
use crate::subscriptions::{NotificationHistory, SubscriptionIndex};
use crate::wire::{
    ClientEvent, EarningsUpdate, LocationUpdate, PassengerNotification, QrScan, Role,
    RouteStatusUpdate, TripCompleted, TripStarted,
};

#[derive(Clone)]
pub struct ApiState {
    pub relay: RelayHandle,
    pub pipeline: Arc<ScanPipeline>,
    pub subscriptions: Arc<SubscriptionIndex>,
    pub history: Arc<NotificationHistory>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/scan", post(ingest_scan))
        .route("/api/subscriptions", post(subscribe))
        .route("/api/subscriptions", delete(unsubscribe))
        .route(
            "/api/passengers/:passenger_id/notifications",
            get(notification_history),
        )
        .route("/api/notifications/:notification_id/read", post(mark_read))
        .route("/api/driver-location", post(ingest_driver_location))
        .route("/api/trip-started", post(ingest_trip_started))
        .route("/api/trip-completed", post(ingest_trip_completed))
        .route("/api/qr-scan", post(ingest_qr_scan))
        .route("/api/earnings-update", post(ingest_earnings_update))
        .route("/api/route-status", post(ingest_route_status))
        .route("/api/passenger-notification", post(ingest_notification))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reject(error: &TrackerError) -> Response {
    let status = match error {
        TrackerError::RouteMismatch { .. }
        | TrackerError::OutOfSequenceScan { .. }
        | TrackerError::UnknownDriver(_)
        | TrackerError::UnknownRoute(_)
        | TrackerError::UnknownCheckpoint(_)
        | TrackerError::InvalidEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"status": "error", "message": error.to_string()})),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanRequest {
    driver_id: String,
    qr: CheckpointQr,
}

async fn ingest_scan(State(state): State<ApiState>, Json(request): Json<ScanRequest>) -> Response {
    match state.pipeline.process(&request.driver_id, &request.qr).await {
        Ok(ScanOutcome::Accepted(summary)) => Json(json!({
            "status": "success",
            "duplicate": false,
            "checkpoint": summary.checkpoint_name,
            "fareFromOrigin": summary.fare_from_origin,
            "eta": summary.eta,
            "conflict": summary.conflict,
            "passengersNotified": summary.passengers_notified,
        }))
        .into_response(),
        Ok(ScanOutcome::Duplicate) => Json(json!({
            "status": "success",
            "duplicate": true,
            "message": "checkpoint already recorded",
        }))
        .into_response(),
        Err(e) => reject(&e),
    }
}

async fn subscribe(
    State(state): State<ApiState>,
    Json(subscription): Json<Subscription>,
) -> Json<serde_json::Value> {
    state.subscriptions.subscribe(subscription).await;
    Json(json!({"status": "success", "message": "subscribed"}))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnsubscribeRequest {
    passenger_id: String,
    route_id: String,
    checkpoint_id: Option<String>,
}

async fn unsubscribe(
    State(state): State<ApiState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Json<serde_json::Value> {
    let removed = state
        .subscriptions
        .unsubscribe(
            &request.passenger_id,
            &request.route_id,
            request.checkpoint_id.as_deref(),
        )
        .await;
    Json(json!({
        "status": "success",
        "message": "unsubscribed",
        "removed": removed,
    }))
}

async fn notification_history(
    State(state): State<ApiState>,
    Path(passenger_id): Path<String>,
) -> Json<serde_json::Value> {
    let notifications = state.history.history(&passenger_id).await;
    Json(json!({"status": "success", "notifications": notifications}))
}

async fn mark_read(
    State(state): State<ApiState>,
    Path(notification_id): Path<Uuid>,
) -> Response {
    if state.history.mark_read(notification_id).await {
        Json(json!({"status": "success", "message": "marked read"})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "unknown notification"})),
        )
            .into_response()
    }
}

/// Bridge ingress: events arrive here from the backend's delivery bridge
/// and are multicast to the proper rooms. The response never carries more
/// than `{success, message}`.
async fn ingest_driver_location(
    State(state): State<ApiState>,
    Json(update): Json<LocationUpdate>,
) -> Response {
    ingress(&state, ClientEvent::DriverLocationUpdate(update), Role::Driver).await
}

async fn ingest_trip_started(
    State(state): State<ApiState>,
    Json(trip): Json<TripStarted>,
) -> Response {
    ingress(&state, ClientEvent::TripStarted(trip), Role::Driver).await
}

async fn ingest_trip_completed(
    State(state): State<ApiState>,
    Json(trip): Json<TripCompleted>,
) -> Response {
    ingress(&state, ClientEvent::TripCompleted(trip), Role::Driver).await
}

async fn ingest_qr_scan(State(state): State<ApiState>, Json(scan): Json<QrScan>) -> Response {
    ingress(&state, ClientEvent::QrScan(scan), Role::Driver).await
}

async fn ingest_earnings_update(
    State(state): State<ApiState>,
    Json(earnings): Json<EarningsUpdate>,
) -> Response {
    ingress(&state, ClientEvent::EarningsUpdate(earnings), Role::Driver).await
}

async fn ingest_route_status(
    State(state): State<ApiState>,
    Json(status): Json<RouteStatusUpdate>,
) -> Response {
    ingress(&state, ClientEvent::RouteStatusUpdate(status), Role::Admin).await
}

async fn ingest_notification(
    State(state): State<ApiState>,
    Json(notification): Json<PassengerNotification>,
) -> Response {
    ingress(
        &state,
        ClientEvent::PassengerNotification(notification),
        Role::Admin,
    )
    .await
}

async fn ingress(state: &ApiState, event: ClientEvent, as_role: Role) -> Response {
    match state.relay.dispatch(as_role, event).await {
        Ok(()) => Json(json!({"success": true, "message": "delivered"})).into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"success": false, "message": e.to_string()})),
        )
            .into_response(),
    }
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let counts = {
        let rooms = state.relay.rooms.read().await;
        rooms.counts_by_role()
    };
    let active_locations = state.relay.locations.active_count().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connected": {
            "drivers": counts.get(&Role::Driver).copied().unwrap_or(0),
            "passengers": counts.get(&Role::Passenger).copied().unwrap_or(0),
            "admins": counts.get(&Role::Admin).copied().unwrap_or(0),
        },
        "activeLocations": active_locations,
    }))
}
