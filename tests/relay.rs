//! Live websocket round-trips against the relay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use jeepney_tracker::relay::{RelayHandle, RelayServer};
use jeepney_tracker::state::LocationStore;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_relay() -> std::net::SocketAddr {
    let handle = RelayHandle::new(std::sync::Arc::new(LocationStore::new()));
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), handle)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: std::net::SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .unwrap();
}

/// Next text frame as JSON, with a test-failure timeout.
async fn recv(client: &mut Client) -> Value {
    let deadline = Duration::from_secs(5);
    loop {
        let msg = timeout(deadline, client.next())
            .await
            .expect("timed out waiting for relay event")
            .expect("connection closed")
            .expect("read error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

fn authenticate(user_id: &str, user_type: &str, route_id: &str) -> Value {
    json!({
        "event": "authenticate",
        "data": {"userId": user_id, "userType": user_type, "routeId": route_id}
    })
}

fn location_update(driver_id: &str, location: &str) -> Value {
    json!({
        "event": "driver-location-update",
        "data": {"driverId": driver_id, "routeId": "r1", "location": location}
    })
}

#[tokio::test]
async fn authenticate_ack_and_connection_count() {
    let addr = spawn_relay().await;
    let mut driver = connect(addr).await;

    send(&mut driver, authenticate("d1", "driver", "r1")).await;
    let ack = recv(&mut driver).await;

    assert_eq!(ack["event"], "authenticated");
    assert_eq!(ack["data"]["success"], true);
    assert_eq!(ack["data"]["connectedUsers"], 1);
    assert!(ack["data"]["socketId"].as_str().is_some());
}

#[tokio::test]
async fn passenger_gets_snapshot_then_live_updates() {
    let addr = spawn_relay().await;

    let mut driver = connect(addr).await;
    send(&mut driver, authenticate("d1", "driver", "r1")).await;
    recv(&mut driver).await; // authenticated

    // Driver reports a location; its own route-room echo is the sync point
    send(&mut driver, location_update("d1", "Crossing Bayabas")).await;
    let echo = recv(&mut driver).await;
    assert_eq!(echo["event"], "driver-location-update");

    // A passenger joining late is seeded with the current snapshot
    let mut passenger = connect(addr).await;
    send(&mut passenger, authenticate("p1", "passenger", "r1")).await;
    let ack = recv(&mut passenger).await;
    assert_eq!(ack["event"], "authenticated");
    assert_eq!(ack["data"]["connectedUsers"], 2);

    let snapshot = recv(&mut passenger).await;
    assert_eq!(snapshot["event"], "initial-driver-locations");
    let locations = snapshot["data"].as_array().unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0]["driverId"], "d1");
    assert_eq!(locations[0]["location"], "Crossing Bayabas");

    // And from then on receives live updates for its route
    send(&mut driver, location_update("d1", "Ulas Crossing")).await;
    let update = recv(&mut passenger).await;
    assert_eq!(update["event"], "driver-location-update");
    assert_eq!(update["data"]["location"], "Ulas Crossing");
}

#[tokio::test]
async fn driver_disconnect_broadcasts_offline_status() {
    let addr = spawn_relay().await;

    let mut driver = connect(addr).await;
    send(&mut driver, authenticate("d1", "driver", "r1")).await;
    recv(&mut driver).await;
    send(&mut driver, location_update("d1", "Toril Terminal")).await;
    recv(&mut driver).await;

    let mut passenger = connect(addr).await;
    send(&mut passenger, authenticate("p1", "passenger", "r1")).await;
    recv(&mut passenger).await; // authenticated
    recv(&mut passenger).await; // snapshot

    driver.close(None).await.unwrap();

    let status = recv(&mut passenger).await;
    assert_eq!(status["event"], "driver-status-update");
    assert_eq!(status["data"]["driverId"], "d1");
    assert_eq!(status["data"]["status"], "offline");
}

#[tokio::test]
async fn out_of_role_event_is_dropped_with_ack_failure() {
    let addr = spawn_relay().await;

    let mut passenger = connect(addr).await;
    send(&mut passenger, authenticate("p1", "passenger", "r1")).await;
    recv(&mut passenger).await; // authenticated
    recv(&mut passenger).await; // snapshot (empty)

    // Passengers may not report driver locations
    send(&mut passenger, location_update("d1", "Toril Terminal")).await;
    let reply = recv(&mut passenger).await;
    assert_eq!(reply["event"], "ack-failure");

    // The connection stays usable afterwards
    send(
        &mut passenger,
        json!({"event": "bogus-event", "data": {}}),
    )
    .await;
    let reply = recv(&mut passenger).await;
    assert_eq!(reply["event"], "ack-failure");
}

#[tokio::test]
async fn events_before_authentication_are_dropped() {
    let addr = spawn_relay().await;

    let mut client = connect(addr).await;
    send(&mut client, location_update("d1", "Toril Terminal")).await;
    let reply = recv(&mut client).await;

    assert_eq!(reply["event"], "ack-failure");
    assert_eq!(reply["data"]["reason"], "not authenticated");
}
