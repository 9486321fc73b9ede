//! Per-socket session: the connection state machine.
//!
//! Each accepted socket runs one session task. The task owns the WebSocket
//! stream outright and `select!`s over two sources:
//!
//! - inbound frames from the peer, and
//! - the connection's [`Outbound`] queue, fed by this session, other
//!   sessions (broadcast, driver displacement), and the heartbeat sweep.
//!
//! Because the socket is never shared, no sink mutex is needed; per-peer
//! frame ordering is simply queue ordering.
//!
//! # State machine
//!
//! ```text
//! Unidentified ──hello──▶ Identified(driver) ─┐
//!      │       └────────▶ Identified(viewer) ─┼──▶ Closed
//!      └── invalid hello: error + close ──────┘
//! ```
//!
//! A later `hello` while identified is a resubscription: the assign/merge/
//! ack flow runs again, so a live socket may change device id, role, route,
//! or direction without reconnecting. Only a failed *first* handshake closes
//! the socket; every other bad input earns an `error` frame and the
//! connection stays open.

use std::net::SocketAddr;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message as WsMessage,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_core::limiter::TokenBucket;
use relay_core::protocol::messages::{Hello, Role, ServerMsg, Telemetry};
use relay_core::protocol::validate::{validate_hello, validate_telemetry};

use crate::application::registry::{ConnId, Outbound, SharedState, CLOSE_PROTOCOL};

// ── Session entry point ───────────────────────────────────────────────────────

/// Top-level handler for a single socket. Wraps [`run_session`] and logs the
/// outcome; this is the entry point for each per-connection task.
pub async fn handle_connection(raw_stream: TcpStream, peer_addr: SocketAddr, state: SharedState) {
    match run_session(raw_stream, peer_addr, state).await {
        Ok(()) => info!("session {peer_addr} closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one connection: WebSocket upgrade,
/// registration, the read/write loop, and cleanup.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails; transport errors after
/// that point are logged and end the session normally.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    state: SharedState,
) -> anyhow::Result<()> {
    let mut ws = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    state.lock().await.register(conn_id, peer_addr, tx);
    debug!("session {peer_addr}: established as {conn_id}");

    let mut session = Session::new(conn_id, state.clone());

    loop {
        tokio::select! {
            // Frames queued for this peer: by its own handler, by other
            // sessions (broadcast/displacement), or by the heartbeat sweep.
            queued = rx.recv() => match queued {
                Some(Outbound::Text(text)) => {
                    if ws.send(WsMessage::Text(text)).await.is_err() {
                        debug!("session {conn_id}: send failed, peer gone");
                        break;
                    }
                }
                Some(Outbound::Ping) => {
                    if ws.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = ws.send(WsMessage::Close(Some(frame))).await;
                    break;
                }
                // Peer presumed unreachable: drop the socket, no handshake.
                Some(Outbound::Terminate) | None => break,
            },

            // Inbound frames from the peer.
            inbound = ws.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => session.handle_text(&text).await,
                Some(Ok(WsMessage::Pong(_))) => {
                    state.lock().await.mark_alive(conn_id);
                }
                // tungstenite queues the pong reply automatically.
                Some(Ok(WsMessage::Ping(_))) => {}
                Some(Ok(WsMessage::Binary(_))) => {
                    // The protocol is JSON text frames only.
                    session.send_error("binary frames are not supported").await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("session {conn_id}: peer closed");
                    break;
                }
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    debug!("session {conn_id}: transport error: {e}");
                    break;
                }
            },
        }
    }

    // Normal close path for every exit: detach from the room (purging it if
    // empty) and drop the peer-table entry. No frames are handled past here.
    session.close();
    state.lock().await.unregister(conn_id);
    Ok(())
}

// ── State machine ─────────────────────────────────────────────────────────────

/// Connection identity, assigned by the `hello` handshake.
#[derive(Debug, Clone, PartialEq)]
enum ConnState {
    /// No valid `hello` seen yet; only a handshake is acceptable.
    Unidentified,
    /// Identified with a role, bound to a device id.
    Identified { role: Role, device_id: String },
    /// Socket is gone; set during cleanup so late calls are inert.
    Closed,
}

/// Per-connection protocol state: identity plus the driver's rate bucket.
struct Session {
    conn_id: ConnId,
    state: SharedState,
    conn_state: ConnState,
    bucket: TokenBucket,
}

impl Session {
    fn new(conn_id: ConnId, state: SharedState) -> Session {
        Session {
            conn_id,
            state,
            conn_state: ConnState::Unidentified,
            bucket: TokenBucket::new(),
        }
    }

    /// Handles one inbound text frame according to the current state.
    async fn handle_text(&mut self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                // Transport-level garbage: tell the peer, stay open.
                self.send_error("invalid JSON payload").await;
                return;
            }
        };

        match self.conn_state.clone() {
            // The first message must be a valid handshake; anything else
            // force-closes — the only input that does.
            ConnState::Unidentified => match validate_hello(&value) {
                Ok(hello) => self.apply_hello(hello).await,
                Err(reason) => {
                    warn!("connection {}: rejected handshake: {reason}", self.conn_id);
                    let st = self.state.lock().await;
                    st.send_msg(self.conn_id, &ServerMsg::error(reason.to_string()));
                    st.send(
                        self.conn_id,
                        Outbound::Close {
                            code: CLOSE_PROTOCOL,
                            reason: "invalid handshake",
                        },
                    );
                    self.conn_state = ConnState::Closed;
                }
            },

            ConnState::Identified { role, device_id } => {
                match value.get("type").and_then(serde_json::Value::as_str) {
                    // Resubscription: re-run the full assign/merge/ack flow.
                    // May change device id, role, route, or direction.
                    Some("hello") => match validate_hello(&value) {
                        Ok(hello) => self.apply_hello(hello).await,
                        Err(reason) => self.send_error(reason.to_string()).await,
                    },
                    Some("telemetry") => match role {
                        Role::Driver => self.handle_telemetry(&device_id, &value).await,
                        Role::Viewer => {
                            self.send_error("Only drivers may send telemetry").await;
                        }
                    },
                    _ => self.send_error("unsupported message type").await,
                }
            }

            ConnState::Closed => {}
        }
    }

    /// Runs the assign/merge/ack flow for a validated handshake (first hello
    /// and resubscriptions alike).
    async fn apply_hello(&mut self, hello: Hello) {
        let role = hello.role;
        let device_id = hello.device_id.clone();

        let mut st = self.state.lock().await;
        st.assign(self.conn_id, &device_id, role);
        st.remember_device(
            &device_id,
            hello.display_name.as_deref(),
            hello.route_id.as_deref(),
            hello.direction.as_deref(),
        );

        // After remember(), the record holds declared fields merged over
        // whatever was already known — exactly what the ack should echo.
        let record = st.device_record(&device_id).cloned().unwrap_or_default();
        st.send_msg(
            self.conn_id,
            &ServerMsg::HelloAck {
                role,
                device_id: device_id.clone(),
                display_name: record.display_name,
                route_id: record.route_id,
                direction: record.direction,
            },
        );

        // Catch-up on subscribe: a new viewer immediately receives the last
        // snapshot, verbatim, before any fresh telemetry.
        if role == Role::Viewer {
            if let Some(snapshot) = st.snapshot(&device_id).map(str::to_string) {
                st.send(self.conn_id, Outbound::Text(snapshot));
            }
        }

        self.conn_state = ConnState::Identified { role, device_id };
    }

    /// Validates, rate-limits, merges, stores, and broadcasts one telemetry
    /// message from the bound driver.
    async fn handle_telemetry(&mut self, bound_device: &str, value: &serde_json::Value) {
        let telemetry = match validate_telemetry(value) {
            Ok(t) => t,
            Err(reason) => {
                self.send_error(reason.to_string()).await;
                return;
            }
        };

        // A driver may only publish for the device it identified as.
        if telemetry.device_id != bound_device {
            self.send_error("deviceId does not match this connection")
                .await;
            return;
        }

        // Rate violation: silent drop, server-side log only.
        if !self.bucket.try_acquire() {
            debug!(
                "connection {}: telemetry for {bound_device} dropped by rate limit",
                self.conn_id
            );
            return;
        }

        let Telemetry {
            device_id,
            lat,
            lng,
            ts,
            speed,
            heading,
            display_name,
            route_id,
            direction,
        } = telemetry;

        let mut st = self.state.lock().await;

        // Explicit fields update the memory; omitted fields fall back to it.
        st.remember_device(
            &device_id,
            display_name.as_deref(),
            route_id.as_deref(),
            direction.as_deref(),
        );
        let record = st.device_record(&device_id).cloned().unwrap_or_default();

        let frame = ServerMsg::Telemetry {
            device_id: device_id.clone(),
            lat,
            lng,
            ts,
            speed,
            heading,
            display_name: record.display_name,
            route_id: record.route_id,
            direction: record.direction,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                warn!("connection {}: telemetry serialization failed: {e}", self.conn_id);
                return;
            }
        };

        st.store_snapshot(&device_id, text.clone());
        let viewers = st.broadcast(&device_id, &text);
        debug!("device {device_id}: telemetry relayed to {viewers} viewer(s)");
    }

    /// Queues an `error` frame to this connection; it stays open.
    async fn send_error(&self, reason: impl Into<String>) {
        self.state
            .lock()
            .await
            .send_msg(self.conn_id, &ServerMsg::error(reason));
    }

    /// Transitions to `Closed`. Called from the session cleanup path.
    fn close(&mut self) {
        self.conn_state = ConnState::Closed;
    }
}
