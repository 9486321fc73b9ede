//! Domain layer: pure configuration types (no I/O).

pub mod config;

pub use config::RelayConfig;
