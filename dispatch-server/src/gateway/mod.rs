//! Realtime gateway: session registry, room membership and outbound
//! fan-out.
//!
//! Each connection owns a bounded outbound queue drained by its socket
//! task, so events emitted to one session arrive in emission order. Emits
//! never block: when a queue is full the frame is dropped and a counter is
//! incremented, because a slow phone must not stall dispatch.

pub mod router;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::enums::VehicleType;
use crate::types::events::OutboundEvent;
use crate::types::primitives::DriverId;

/// Outbound queue depth per session.
const OUTBOUND_BUFFER: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════════
// SESSIONS & ROOMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque per-connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Who a session authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// A driver connection.
    Driver(DriverId),
    /// A passenger connection, keyed by internal user id.
    User(Uuid),
}

/// Room addressing scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// All online drivers of one vehicle type; the dispatch fan-out target.
    Drivers(VehicleType),
    /// One driver's private channel.
    Driver(DriverId),
    /// One passenger's private channel (string form of the internal id).
    User(String),
}

impl Room {
    /// The room's wire name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Drivers(vt) => format!("drivers_{vt}"),
            Self::Driver(id) => format!("driver_{id}"),
            Self::User(id) => id.clone(),
        }
    }
}

#[derive(Debug)]
struct SessionHandle {
    tx: mpsc::Sender<serde_json::Value>,
    identity: Mutex<Option<Identity>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-wide connection registry.
#[derive(Debug, Default)]
pub struct Gateway {
    sessions: DashMap<u64, SessionHandle>,
    rooms: DashMap<String, HashSet<u64>>,
    memberships: DashMap<u64, HashSet<String>>,
    next_id: AtomicU64,
}

impl Gateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection; the receiver is drained by the socket's
    /// send task.
    #[must_use]
    pub fn register(&self) -> (SessionId, mpsc::Receiver<serde_json::Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.sessions.insert(
            id,
            SessionHandle {
                tx,
                identity: Mutex::new(None),
            },
        );
        debug!(session = %SessionId(id), "Session registered");
        (SessionId(id), rx)
    }

    /// Drop a connection and leave all its rooms.
    pub fn unregister(&self, session: SessionId) {
        self.sessions.remove(&session.0);
        if let Some((_, rooms)) = self.memberships.remove(&session.0) {
            for room in rooms {
                if let Some(mut members) = self.rooms.get_mut(&room) {
                    members.remove(&session.0);
                }
            }
        }
        debug!(session = %session, "Session unregistered");
    }

    /// Bind an identity to a session, replacing any previous binding.
    pub fn bind_identity(&self, session: SessionId, identity: Identity) {
        if let Some(handle) = self.sessions.get(&session.0) {
            *handle.identity.lock() = Some(identity);
        }
    }

    /// The identity bound to a session, if any.
    #[must_use]
    pub fn identity(&self, session: SessionId) -> Option<Identity> {
        self.sessions
            .get(&session.0)
            .and_then(|h| h.identity.lock().clone())
    }

    /// Join a room. A later registration for the same driver replaces the
    /// earlier socket in practice because the old one unregisters on
    /// disconnect.
    pub fn join(&self, session: SessionId, room: &Room) {
        let name = room.name();
        self.rooms.entry(name.clone()).or_default().insert(session.0);
        self.memberships.entry(session.0).or_default().insert(name);
    }

    /// Leave a room.
    pub fn leave(&self, session: SessionId, room: &Room) {
        let name = room.name();
        if let Some(mut members) = self.rooms.get_mut(&name) {
            members.remove(&session.0);
        }
        if let Some(mut rooms) = self.memberships.get_mut(&session.0) {
            rooms.remove(&name);
        }
    }

    /// Number of sessions currently in a room.
    #[must_use]
    pub fn room_size(&self, room: &Room) -> usize {
        self.rooms.get(&room.name()).map_or(0, |m| m.len())
    }

    /// Emit to one session.
    pub fn emit_to(&self, session: SessionId, event: &OutboundEvent) {
        self.send_frame(session.0, event);
    }

    /// Emit to every member of a room, optionally excluding one session
    /// (the acceptance winner must not be told the ride is gone).
    pub fn emit_room(&self, room: &Room, event: &OutboundEvent, exclude: Option<SessionId>) {
        let Some(members) = self.rooms.get(&room.name()) else {
            return;
        };
        let targets: Vec<u64> = members
            .iter()
            .copied()
            .filter(|id| exclude.is_none_or(|ex| ex.0 != *id))
            .collect();
        drop(members);
        for id in targets {
            self.send_frame(id, event);
        }
    }

    /// Emit to every connected session.
    pub fn emit_all(&self, event: &OutboundEvent) {
        let targets: Vec<u64> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in targets {
            self.send_frame(id, event);
        }
    }

    /// Queue a raw frame (acknowledgement bodies) on a session's ordered
    /// queue. Returns whether the frame was accepted.
    pub fn send_raw(&self, session: SessionId, frame: serde_json::Value) -> bool {
        let Some(handle) = self.sessions.get(&session.0) else {
            return false;
        };
        if handle.tx.try_send(frame).is_err() {
            metrics::counter!("gateway_dropped_events").increment(1);
            return false;
        }
        true
    }

    fn send_frame(&self, session: u64, event: &OutboundEvent) {
        let Some(handle) = self.sessions.get(&session) else {
            return;
        };
        if handle.tx.try_send(event.frame()).is_err() {
            metrics::counter!("gateway_dropped_events").increment(1);
            warn!(
                session = %SessionId(session),
                event = event.name(),
                "Outbound queue full or closed, frame dropped"
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
