//! relay-server library crate.
//!
//! The relay accepts WebSocket connections, runs the `hello` handshake, and
//! fans each driver's telemetry out to the viewers subscribed to the same
//! device id.
//!
//! # Architecture
//!
//! ```text
//! Driver / Viewer (JSON over WebSocket)
//!         ↕
//! [relay-server]
//!   ├── domain/           RelayConfig (plain struct, no env reads)
//!   ├── application/      RelayState: rooms, snapshots, device memory, peers
//!   └── infrastructure/
//!         ├── ws_server/  accept loop + graceful shutdown
//!         ├── session/    per-socket state machine (tokio-tungstenite)
//!         └── heartbeat/  ping/pong liveness sweep
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async, no frameworks.
//! - `application` owns all shared mutable state behind one coarse mutex;
//!   it knows nothing about sockets, only about per-peer outbound queues.
//! - `infrastructure` depends on the other layers plus `tokio` and
//!   `tungstenite`, and is the only place a socket is ever touched.
//!
//! The coarse mutex is deliberate: every room mutation and broadcast is a
//! short, purely in-memory critical section, so one lock keeps the handshake
//! and telemetry paths serialized the way the protocol requires without a
//! lock-ordering story.

/// Domain layer: configuration.
pub mod domain;

/// Application layer: rooms, snapshots, device memory, peer table.
pub mod application;

/// Infrastructure layer: WebSocket server, sessions, heartbeat.
pub mod infrastructure;
