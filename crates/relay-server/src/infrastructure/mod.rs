//! Infrastructure layer: everything that touches a socket or a timer.

pub mod heartbeat;
pub mod session;
pub mod ws_server;

pub use ws_server::RelayServer;
