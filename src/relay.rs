//! Realtime transport: the websocket relay.
//!
//! One task per connection; a per-connection writer task drains an
//! unbounded channel so broadcasts never await a slow peer. A session is
//! unauthenticated until its `authenticate` event, then joins rooms by
//! role. Malformed or out-of-role events are dropped with a warning and an
//! advisory ack-failure, never a client-visible hard error.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::TrackerError;
use crate::rooms::{entity_room, role_room, route_room, Identity, RoomRegistry};
use crate::state::LocationStore;
use crate::wire::{ClientEvent, Role, ServerEvent};

/// Shared relay state: the room/session registry and the location store,
/// both owned exclusively by the relay side of the process.
#[derive(Clone)]
pub struct RelayHandle {
    pub rooms: Arc<RwLock<RoomRegistry>>,
    pub locations: Arc<LocationStore>,
}

impl RelayHandle {
    pub fn new(locations: Arc<LocationStore>) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(RoomRegistry::new())),
            locations,
        }
    }

    /// Validate an event against its sender's role and multicast it to the
    /// rooms it belongs in, always including the admin room. This is the
    /// one routing pipeline shared by websocket sessions and the HTTP
    /// bridge ingress.
    pub async fn dispatch(&self, sender: Role, event: ClientEvent) -> Result<(), TrackerError> {
        if let Some(required) = event.required_role() {
            if sender != required {
                return Err(TrackerError::InvalidEvent(format!(
                    "{:?} session may not emit this event",
                    sender
                )));
            }
        }

        match event {
            ClientEvent::Authenticate(_) => {
                // Authentication is connection-scoped, handled in the
                // session loop; it never reaches routing.
                Err(TrackerError::InvalidEvent(
                    "authenticate is not routable".to_string(),
                ))
            }
            ClientEvent::DriverLocationUpdate(update) => {
                self.locations
                    .upsert(update.clone().into_record(Utc::now()))
                    .await;
                let rooms = vec![route_room(&update.route_id), admin_room()];
                self.broadcast(&rooms, &ServerEvent::DriverLocationUpdate(update))
                    .await;
                Ok(())
            }
            ClientEvent::TripStarted(trip) => {
                let rooms = vec![route_room(&trip.route_id), admin_room()];
                self.broadcast(&rooms, &ServerEvent::TripStarted(trip)).await;
                Ok(())
            }
            ClientEvent::TripCompleted(trip) => {
                let mut rooms = vec![admin_room()];
                rooms.extend(entity_room(Role::Driver, &trip.driver_id));
                if let Some(passenger_id) = &trip.passenger_id {
                    rooms.extend(entity_room(Role::Passenger, passenger_id));
                }
                self.broadcast(&rooms, &ServerEvent::TripCompleted(trip))
                    .await;
                Ok(())
            }
            ClientEvent::QrScan(scan) => {
                let mut rooms = vec![admin_room()];
                rooms.extend(entity_room(Role::Passenger, &scan.passenger_id));
                rooms.extend(entity_room(Role::Driver, &scan.driver_id));
                self.broadcast(&rooms, &ServerEvent::QrScanNotification(scan))
                    .await;
                Ok(())
            }
            ClientEvent::EarningsUpdate(earnings) => {
                let mut rooms = vec![admin_room()];
                rooms.extend(entity_room(Role::Driver, &earnings.driver_id));
                self.broadcast(&rooms, &ServerEvent::EarningsUpdate(earnings))
                    .await;
                Ok(())
            }
            ClientEvent::PassengerNotification(notification) => {
                let mut rooms = vec![admin_room()];
                rooms.extend(entity_room(Role::Passenger, &notification.passenger_id));
                self.broadcast(&rooms, &ServerEvent::Notification(notification))
                    .await;
                Ok(())
            }
            ClientEvent::RouteStatusUpdate(status) => {
                let rooms = vec![route_room(&status.route_id), admin_room()];
                self.broadcast(&rooms, &ServerEvent::RouteStatusUpdate(status))
                    .await;
                Ok(())
            }
        }
    }

    pub async fn broadcast(&self, rooms: &[String], event: &ServerEvent) {
        self.rooms.read().await.broadcast(rooms, event);
    }
}

fn admin_room() -> String {
    role_room(Role::Admin).to_string()
}

pub struct RelayServer {
    listener: TcpListener,
    handle: RelayHandle,
}

impl RelayServer {
    pub async fn bind(addr: SocketAddr, handle: RelayHandle) -> Result<Self, TrackerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);
        Ok(Self { listener, handle })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TrackerError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<(), TrackerError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let handle = self.handle.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handle, peer).await {
                    warn!(%peer, "Connection ended with error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    handle: RelayHandle,
    peer: SocketAddr,
) -> Result<(), TrackerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_write.send(msg).await.is_err() {
                break;
            }
        }
    });

    let session_id = Uuid::new_v4().to_string();
    handle.rooms.write().await.connect(&session_id, tx);
    info!(session = %session_id, %peer, "Session connected");

    while let Some(msg) = ws_read.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %session_id, "Read error: {}", e);
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        if !msg.is_text() {
            continue;
        }
        let event: ClientEvent = match serde_json::from_str(msg.to_text()?) {
            Ok(event) => event,
            Err(e) => {
                warn!(session = %session_id, "Malformed event dropped: {}", e);
                handle.rooms.read().await.send(
                    &session_id,
                    &ServerEvent::AckFailure {
                        reason: "malformed event".to_string(),
                    },
                );
                continue;
            }
        };

        match event {
            ClientEvent::Authenticate(auth) => {
                let identity = Identity {
                    user_id: auth.user_id.clone(),
                    role: auth.user_type,
                    route_id: auth.route_id.clone(),
                };
                let connected = {
                    let mut rooms = handle.rooms.write().await;
                    rooms.authenticate(&session_id, identity)
                };
                info!(
                    session = %session_id,
                    user = %auth.user_id,
                    role = ?auth.user_type,
                    "Session authenticated"
                );
                handle.rooms.read().await.send(
                    &session_id,
                    &ServerEvent::Authenticated {
                        success: true,
                        socket_id: session_id.clone(),
                        connected_users: connected,
                    },
                );

                // A newly joined passenger must never be blind until the
                // next event: seed it with the current route snapshot.
                if auth.user_type == Role::Passenger {
                    if let Some(route_id) = &auth.route_id {
                        let snapshot = handle.locations.snapshot(route_id).await;
                        handle
                            .rooms
                            .read()
                            .await
                            .send(&session_id, &ServerEvent::InitialDriverLocations(snapshot));
                    }
                }
            }
            event => {
                let identity = {
                    let rooms = handle.rooms.read().await;
                    rooms.identity(&session_id).cloned()
                };
                let Some(identity) = identity else {
                    warn!(session = %session_id, "Event before authentication dropped");
                    handle.rooms.read().await.send(
                        &session_id,
                        &ServerEvent::AckFailure {
                            reason: "not authenticated".to_string(),
                        },
                    );
                    continue;
                };
                if let Err(e) = handle.dispatch(identity.role, event).await {
                    warn!(session = %session_id, "Event dropped: {}", e);
                    handle.rooms.read().await.send(
                        &session_id,
                        &ServerEvent::AckFailure {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }
    }

    let identity = handle.rooms.write().await.disconnect(&session_id);
    writer.abort();
    info!(session = %session_id, "Session disconnected");

    // A dropped driver connection flips its live record offline and tells
    // the route room.
    if let Some(identity) = identity {
        if identity.role == Role::Driver {
            handle.locations.mark_offline(&identity.user_id).await;
            if let Some(route_id) = &identity.route_id {
                handle
                    .broadcast(
                        &[route_room(route_id), admin_room()],
                        &ServerEvent::DriverStatusUpdate {
                            driver_id: identity.user_id.clone(),
                            status: crate::models::DriverStatus::Offline,
                        },
                    )
                    .await;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{LocationUpdate, QrScan, RouteStatusUpdate};

    fn handle() -> RelayHandle {
        RelayHandle::new(Arc::new(LocationStore::new()))
    }

    #[tokio::test]
    async fn dispatch_rejects_out_of_role_events() {
        let relay = handle();
        let event = ClientEvent::RouteStatusUpdate(RouteStatusUpdate {
            route_id: "r1".into(),
            status: "suspended".into(),
            message: None,
        });

        let err = relay.dispatch(Role::Passenger, event).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn driver_location_dispatch_updates_store() {
        let relay = handle();
        let event = ClientEvent::DriverLocationUpdate(LocationUpdate {
            driver_id: "d1".into(),
            route_id: "r1".into(),
            location: "Crossing Bayabas".into(),
            coordinates: None,
            jeepney_number: Some("JPN-101".into()),
            driver_name: None,
            is_origin: false,
            is_endpoint: false,
            conflict: None,
        });

        relay.dispatch(Role::Driver, event).await.unwrap();

        let record = relay.locations.get("d1").await.unwrap();
        assert_eq!(record.location, "Crossing Bayabas");
        assert_eq!(record.jeepney_number.as_deref(), Some("JPN-101"));
    }

    #[tokio::test]
    async fn qr_scan_reaches_passenger_entity_room() {
        let relay = handle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut rooms = relay.rooms.write().await;
            rooms.connect("s1", tx);
            rooms.authenticate(
                "s1",
                Identity {
                    user_id: "p1".into(),
                    role: Role::Passenger,
                    route_id: None,
                },
            );
        }

        let event = ClientEvent::QrScan(QrScan {
            driver_id: "d1".into(),
            passenger_id: "p1".into(),
            amount: 12.0,
            checkpoint: "Crossing Bayabas".into(),
            trip_id: None,
        });
        relay.dispatch(Role::Driver, event).await.unwrap();

        let msg = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        assert_eq!(value["event"], "qr-scan-notification");
        assert_eq!(value["data"]["passengerId"], "p1");
    }

    #[tokio::test]
    async fn authenticate_is_not_routable() {
        let relay = handle();
        let event = ClientEvent::Authenticate(crate::wire::AuthRequest {
            user_id: "d1".into(),
            user_type: Role::Driver,
            route_id: None,
            driver_info: None,
        });

        assert!(relay.dispatch(Role::Driver, event).await.is_err());
    }
}
