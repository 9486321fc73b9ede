//! # relay-core
//!
//! Shared library for Transit Relay containing the JSON wire protocol,
//! handshake/telemetry validation, the per-driver token-bucket rate limiter,
//! and the device-memory map.
//!
//! This crate is pure: it has zero dependencies on sockets, async runtimes,
//! or OS APIs, which keeps every piece unit-testable in isolation.
//!
//! # What lives here
//!
//! - **`protocol`** – The wire messages (`hello`, `telemetry`, `hello-ack`,
//!   `error`, `info`) and the validators that turn untrusted JSON into typed
//!   structs, producing specific human-readable reasons on failure.
//!
//! - **`limiter`** – A continuous-refill token bucket that bounds how fast a
//!   single driver may publish telemetry.
//!
//! - **`memory`** – Per-device recall of display name and route metadata
//!   that outlives individual connections.

pub mod limiter;
pub mod memory;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::ServerMsg` instead of `relay_core::protocol::messages::ServerMsg`.
pub use limiter::TokenBucket;
pub use memory::{DeviceMemory, DeviceRecord};
pub use protocol::messages::{Hello, Role, ServerMsg, Telemetry};
pub use protocol::validate::{validate_hello, validate_telemetry, ValidateError};
