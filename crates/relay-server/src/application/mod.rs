//! Application layer: the room registry and shared relay state.

pub mod registry;

pub use registry::{ConnId, Outbound, RelayState, SharedState, CLOSE_PROTOCOL, CLOSE_REPLACED};
