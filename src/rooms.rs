//! Relay session and room registry.
//!
//! Rooms are named multicast groups: one per route (`route-{id}`), one per
//! role (`drivers`/`passengers`/`admins`) and one per entity
//! (`driver-{id}`/`passenger-{id}`). All membership mutations go through
//! this single registry behind one lock; outbound delivery uses each
//! session's unbounded sender so a slow peer never blocks the relay.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::wire::{Role, ServerEvent};

pub fn route_room(route_id: &str) -> String {
    format!("route-{}", route_id)
}

pub fn role_room(role: Role) -> &'static str {
    match role {
        Role::Driver => "drivers",
        Role::Passenger => "passengers",
        Role::Admin => "admins",
    }
}

pub fn entity_room(role: Role, user_id: &str) -> Option<String> {
    match role {
        Role::Driver => Some(format!("driver-{}", user_id)),
        Role::Passenger => Some(format!("passenger-{}", user_id)),
        Role::Admin => None,
    }
}

/// Authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub route_id: Option<String>,
}

struct SessionHandle {
    tx: UnboundedSender<Message>,
    identity: Option<Identity>,
}

#[derive(Default)]
pub struct RoomRegistry {
    sessions: HashMap<String, SessionHandle>,
    rooms: HashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected, unauthenticated session.
    pub fn connect(&mut self, session_id: &str, tx: UnboundedSender<Message>) {
        self.sessions
            .insert(session_id.to_string(), SessionHandle { tx, identity: None });
    }

    /// Attach an identity and join the rooms its role implies. A second
    /// authenticate replaces the previous identity: memberships from the
    /// old one are dropped first. Returns the number of authenticated
    /// sessions, for the authentication ack.
    pub fn authenticate(&mut self, session_id: &str, identity: Identity) -> usize {
        for members in self.rooms.values_mut() {
            members.remove(session_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
        let mut joined = vec![role_room(identity.role).to_string()];
        if let Some(route_id) = &identity.route_id {
            joined.push(route_room(route_id));
        }
        if let Some(room) = entity_room(identity.role, &identity.user_id) {
            joined.push(room);
        }
        for room in joined {
            self.rooms
                .entry(room)
                .or_default()
                .insert(session_id.to_string());
        }
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.identity = Some(identity);
        }
        self.connected_count()
    }

    pub fn identity(&self, session_id: &str) -> Option<&Identity> {
        self.sessions.get(session_id)?.identity.as_ref()
    }

    /// Drop the session and all its room memberships. Returns the identity
    /// it held, so the caller can run disconnect side effects.
    pub fn disconnect(&mut self, session_id: &str) -> Option<Identity> {
        for members in self.rooms.values_mut() {
            members.remove(session_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
        self.sessions.remove(session_id)?.identity
    }

    /// Serialize once and send to every member of the given rooms; a
    /// session in several target rooms still receives one copy.
    pub fn broadcast(&self, rooms: &[String], event: &ServerEvent) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Dropping unserializable event: {}", e);
                return;
            }
        };
        let mut delivered: HashSet<&str> = HashSet::new();
        for room in rooms {
            let Some(members) = self.rooms.get(room) else {
                continue;
            };
            for session_id in members {
                if !delivered.insert(session_id.as_str()) {
                    continue;
                }
                if let Some(session) = self.sessions.get(session_id) {
                    // A closed receiver just means the peer is going away
                    let _ = session.tx.send(Message::Text(text.clone()));
                }
            }
        }
    }

    /// Send to one session only.
    pub fn send(&self, session_id: &str, event: &ServerEvent) {
        if let Some(session) = self.sessions.get(session_id) {
            if let Ok(text) = serde_json::to_string(event) {
                let _ = session.tx.send(Message::Text(text));
            }
        }
    }

    pub fn connected_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.identity.is_some())
            .count()
    }

    /// Authenticated session counts per role, for the health endpoint.
    pub fn counts_by_role(&self) -> HashMap<Role, usize> {
        let mut counts = HashMap::new();
        for session in self.sessions.values() {
            if let Some(identity) = &session.identity {
                *counts.entry(identity.role).or_insert(0) += 1;
            }
        }
        counts
    }
}
