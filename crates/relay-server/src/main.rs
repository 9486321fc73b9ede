//! Transit Relay — entry point.
//!
//! A single-process, in-memory relay: one "driver" connection per device id
//! streams position telemetry over WebSocket, and every "viewer" connection
//! subscribed to that device id receives it with minimal latency.
//!
//! # Usage
//!
//! ```text
//! transit-relay [OPTIONS]
//!
//! Options:
//!   --port <PORT>                  WebSocket listener port [default: 8080]
//!   --bind <ADDR>                  Bind address [default: 0.0.0.0]
//!   --heartbeat-interval-ms <MS>   Liveness sweep interval [default: 30000]
//!   --memory-ttl-secs <SECS>       Device-memory retention [default: 86400]
//! ```
//!
//! Each option can also be set via environment variable (`RELAY_PORT`,
//! `RELAY_BIND`, `RELAY_HEARTBEAT_MS`, `RELAY_MEMORY_TTL`); CLI args take
//! precedence when both are present. Log level is controlled by `RUST_LOG`
//! (default `info`).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::RelayConfig;
use relay_server::infrastructure::RelayServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Real-time location relay for driver/viewer telemetry over WebSocket.
#[derive(Debug, Parser)]
#[command(
    name = "transit-relay",
    about = "Relays driver position telemetry to subscribed viewers",
    version
)]
struct Cli {
    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// IP address to bind to. Use `0.0.0.0` to accept connections from any
    /// interface, or `127.0.0.1` for local-only.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    bind: String,

    /// Liveness sweep interval in milliseconds. A connection that fails to
    /// answer a ping within one full interval is forcibly terminated.
    #[arg(long, default_value_t = 30_000, env = "RELAY_HEARTBEAT_MS")]
    heartbeat_interval_ms: u64,

    /// How long (seconds) remembered display-name/route metadata survives
    /// without any message from its device.
    #[arg(long, default_value_t = 86_400, env = "RELAY_MEMORY_TTL")]
    memory_ttl_secs: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;

        Ok(RelayConfig {
            bind_addr,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            memory_ttl: Duration::from_secs(self.memory_ttl_secs),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls verbosity; default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_relay_config()?;

    info!(
        "transit-relay starting — bind={}, heartbeat={:?}",
        config.bind_addr, config.heartbeat_interval
    );

    // Shared shutdown flag, set by Ctrl+C. The accept loop polls it every
    // 200 ms; on shutdown the heartbeat stops and all connections close.
    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let server = RelayServer::bind(config).await?;
    server.run(running).await?;

    info!("transit-relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
