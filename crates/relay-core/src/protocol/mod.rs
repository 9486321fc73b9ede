//! The JSON-over-WebSocket wire protocol.
//!
//! Clients exchange UTF-8 text frames, each carrying one JSON object with a
//! `"type"` field that identifies the message:
//!
//! ```text
//! Client → Server:  {"type":"hello","role":"driver","deviceId":"bus-1",...}
//!                   {"type":"telemetry","deviceId":"bus-1","lat":..,"lng":..,"ts":..}
//! Server → Client:  {"type":"hello-ack","role":"driver","deviceId":"bus-1",...}
//!                   {"type":"telemetry",...}   (broadcast / catch-up)
//!                   {"type":"error","error":"..."}
//!                   {"type":"info","message":"..."}
//! ```
//!
//! Inbound frames are parsed to [`serde_json::Value`] and checked by the
//! functions in [`validate`], which produce either a typed struct or a
//! specific human-readable reason. Outbound frames are serde structs in
//! [`messages`] so malformed server output is a compile-time impossibility.

pub mod messages;
pub mod validate;
