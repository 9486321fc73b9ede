//! Rooms, snapshots, device memory, and the peer table.
//!
//! [`RelayState`] is an owned service object holding every piece of shared
//! mutable state, injected into the session and heartbeat layers as
//! [`SharedState`] (one coarse `tokio::sync::Mutex`). Nothing here touches a
//! socket: a peer is reachable only through its outbound [`Outbound`] queue,
//! which keeps the whole module unit-testable with plain channels.
//!
//! # Invariants
//!
//! - A room with no driver and no viewers does not exist (eagerly deleted,
//!   together with its telemetry snapshot).
//! - A connection occupies at most one room at a time; every assignment
//!   detaches first.
//! - At most one connection holds the driver role for a device id at any
//!   instant; a newly accepted driver displaces and closes the prior holder.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use relay_core::memory::{DeviceMemory, DeviceRecord};
use relay_core::protocol::messages::{Role, ServerMsg};

/// Identifies one accepted socket for the lifetime of the process.
pub type ConnId = Uuid;

/// The shared handle every task holds.
pub type SharedState = Arc<tokio::sync::Mutex<RelayState>>;

/// Close code sent to a driver displaced by a newer driver for the same
/// device id. In the private-use range so clients can distinguish it from
/// protocol errors.
pub const CLOSE_REPLACED: u16 = 4000;

/// Close code for a failed handshake (RFC 6455 "policy violation").
pub const CLOSE_PROTOCOL: u16 = 1008;

// ── Outbound queue ────────────────────────────────────────────────────────────

/// Frames queued to a session's writer half.
///
/// The session loop owns the socket; everyone else (other sessions, the
/// heartbeat sweep) communicates with it only through this queue, so frame
/// ordering per connection is the queue ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A JSON text frame, already serialized.
    Text(String),
    /// A WebSocket protocol-level ping (liveness probe).
    Ping,
    /// Graceful close: send a Close frame with this code, then stop.
    Close { code: u16, reason: &'static str },
    /// Ungraceful termination: drop the socket without a close handshake.
    /// Used when the peer is presumed unreachable.
    Terminate,
}

// ── Internal records ──────────────────────────────────────────────────────────

/// One tracked connection.
struct Peer {
    tx: mpsc::UnboundedSender<Outbound>,
    addr: SocketAddr,
    /// Cleared by each liveness sweep, set again by the peer's pong.
    alive: bool,
}

/// One per-device grouping: at most one driver plus its viewers.
#[derive(Default)]
struct Room {
    driver: Option<ConnId>,
    viewers: HashSet<ConnId>,
}

impl Room {
    fn is_empty(&self) -> bool {
        self.driver.is_none() && self.viewers.is_empty()
    }
}

// ── RelayState ────────────────────────────────────────────────────────────────

/// All shared relay state: peer table, rooms, snapshots, device memory.
pub struct RelayState {
    peers: HashMap<ConnId, Peer>,
    rooms: HashMap<String, Room>,
    /// Which room (device id) each connection currently occupies.
    occupancy: HashMap<ConnId, String>,
    /// Last broadcast telemetry, stored as the exact serialized frame so a
    /// late viewer's catch-up is byte-for-byte what earlier viewers saw.
    snapshots: HashMap<String, String>,
    memory: DeviceMemory,
}

impl RelayState {
    pub fn new(memory: DeviceMemory) -> RelayState {
        RelayState {
            peers: HashMap::new(),
            rooms: HashMap::new(),
            occupancy: HashMap::new(),
            snapshots: HashMap::new(),
            memory,
        }
    }

    // ── Peer table ────────────────────────────────────────────────────────────

    /// Starts tracking a freshly accepted connection.
    pub fn register(&mut self, conn_id: ConnId, addr: SocketAddr, tx: mpsc::UnboundedSender<Outbound>) {
        self.peers.insert(
            conn_id,
            Peer {
                tx,
                addr,
                alive: true,
            },
        );
        debug!("registered connection {conn_id} from {addr}");
    }

    /// Stops tracking a connection and removes it from its room.
    pub fn unregister(&mut self, conn_id: ConnId) {
        self.detach(conn_id);
        if let Some(peer) = self.peers.remove(&conn_id) {
            debug!("unregistered connection {conn_id} from {}", peer.addr);
        }
    }

    /// Marks a connection as having answered the last ping.
    pub fn mark_alive(&mut self, conn_id: ConnId) {
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.alive = true;
        }
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Queues a frame to one connection. A closed or missing peer is
    /// silently skipped; its session cleans itself up on exit.
    pub fn send(&self, conn_id: ConnId, frame: Outbound) {
        if let Some(peer) = self.peers.get(&conn_id) {
            let _ = peer.tx.send(frame);
        }
    }

    /// Serializes and queues a [`ServerMsg`] to one connection.
    pub fn send_msg(&self, conn_id: ConnId, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(text) => self.send(conn_id, Outbound::Text(text)),
            Err(e) => error!("failed to serialize server frame: {e}"),
        }
    }

    // ── Rooms ─────────────────────────────────────────────────────────────────

    /// Places a connection into the room for `device_id` with the given
    /// role, detaching it from any room it currently occupies first.
    ///
    /// A driver assignment displaces a *different* existing driver: the
    /// prior holder is told why (`info` frame) and closed with
    /// [`CLOSE_REPLACED`].
    pub fn assign(&mut self, conn_id: ConnId, device_id: &str, role: Role) {
        self.detach(conn_id);

        let room = self.rooms.entry(device_id.to_string()).or_default();

        match role {
            Role::Driver => {
                if let Some(prev) = room.driver.filter(|prev| *prev != conn_id) {
                    room.driver = None;
                    self.occupancy.remove(&prev);
                    info!("device {device_id}: driver {prev} displaced by {conn_id}");
                    self.send_msg(prev, &ServerMsg::info("Another driver connected"));
                    self.send(
                        prev,
                        Outbound::Close {
                            code: CLOSE_REPLACED,
                            reason: "replaced by another driver",
                        },
                    );
                }
                // Re-borrow: the displacement sends above needed `&self`.
                let room = self.rooms.entry(device_id.to_string()).or_default();
                room.driver = Some(conn_id);
                info!("device {device_id}: driver {conn_id} attached");
            }
            Role::Viewer => {
                room.viewers.insert(conn_id);
                debug!("device {device_id}: viewer {conn_id} attached");
            }
        }

        self.occupancy.insert(conn_id, device_id.to_string());
    }

    /// Removes a connection from its room, if it occupies one.
    ///
    /// Deletes the room and its telemetry snapshot once neither a driver nor
    /// any viewer remains.
    pub fn detach(&mut self, conn_id: ConnId) {
        let Some(device_id) = self.occupancy.remove(&conn_id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&device_id) else {
            return;
        };

        if room.driver == Some(conn_id) {
            room.driver = None;
        } else {
            room.viewers.remove(&conn_id);
        }

        if room.is_empty() {
            self.rooms.remove(&device_id);
            self.snapshots.remove(&device_id);
            info!("device {device_id}: room emptied, snapshot purged");
        }
    }

    /// Queues `text` to every viewer currently in the device's room.
    /// Returns the number of viewers actually reached; a viewer whose
    /// session already hung up is skipped and not counted.
    pub fn broadcast(&self, device_id: &str, text: &str) -> usize {
        let Some(room) = self.rooms.get(device_id) else {
            return 0;
        };
        room.viewers
            .iter()
            .filter(|viewer| match self.peers.get(viewer) {
                Some(peer) => peer.tx.send(Outbound::Text(text.to_string())).is_ok(),
                None => false,
            })
            .count()
    }

    /// Overwrites the last-broadcast snapshot for a device.
    pub fn store_snapshot(&mut self, device_id: &str, text: String) {
        self.snapshots.insert(device_id.to_string(), text);
    }

    /// The last-broadcast snapshot for a device, if its room still exists.
    pub fn snapshot(&self, device_id: &str) -> Option<&str> {
        self.snapshots.get(device_id).map(String::as_str)
    }

    // ── Device memory ─────────────────────────────────────────────────────────

    /// Merges declared metadata into the device memory (explicit fields win,
    /// omitted fields keep their remembered value).
    pub fn remember_device(
        &mut self,
        device_id: &str,
        display_name: Option<&str>,
        route_id: Option<&str>,
        direction: Option<&str>,
    ) {
        self.memory
            .remember(device_id, display_name, route_id, direction);
    }

    /// The merged remembered record for a device.
    pub fn device_record(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.memory.lookup(device_id)
    }

    /// Evicts expired device-memory entries.
    pub fn prune_memory(&mut self, now: Instant) -> usize {
        self.memory.prune(now)
    }

    // ── Liveness ──────────────────────────────────────────────────────────────

    /// One heartbeat sweep over every tracked connection.
    ///
    /// A peer that never answered the previous ping is terminated without a
    /// close handshake (it is presumed unreachable); everyone else has their
    /// flag cleared and a fresh ping queued. Returns `(pinged, terminated)`.
    pub fn liveness_sweep(&mut self) -> (usize, usize) {
        let mut pinged = 0;
        let mut terminated = 0;
        for (conn_id, peer) in &mut self.peers {
            if peer.alive {
                peer.alive = false;
                let _ = peer.tx.send(Outbound::Ping);
                pinged += 1;
            } else {
                debug!("connection {conn_id} missed heartbeat, terminating");
                let _ = peer.tx.send(Outbound::Terminate);
                terminated += 1;
            }
        }
        (pinged, terminated)
    }

    /// Force-closes every tracked connection. Used on shutdown.
    pub fn terminate_all(&mut self) {
        for peer in self.peers.values() {
            let _ = peer.tx.send(Outbound::Terminate);
        }
    }
}

/// Builds the shared state handle from a config-derived device memory.
pub fn shared(memory: DeviceMemory) -> SharedState {
    Arc::new(tokio::sync::Mutex::new(RelayState::new(memory)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
