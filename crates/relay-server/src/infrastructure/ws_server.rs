//! WebSocket server: accept loop and lifecycle.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming connections and spawning one session task each.
//! 3. Running the heartbeat sweep alongside the accept loop.
//! 4. Graceful shutdown: when the `running` flag clears, stop the heartbeat,
//!    force-close every open connection, and stop accepting new ones.
//!
//! The accept loop never blocks indefinitely: it uses a short timeout on
//! `accept()` so it can poll the shutdown flag even when nobody is
//! connecting. Each session runs in its own Tokio task, so one slow client
//! never delays another.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{error, info};

use relay_core::memory::DeviceMemory;

use crate::application::registry::{self, SharedState};
use crate::domain::config::RelayConfig;
use crate::infrastructure::heartbeat::run_heartbeat;
use crate::infrastructure::session::handle_connection;

/// A bound relay server, ready to run.
///
/// Binding and running are separate steps so callers (and integration tests)
/// can bind port `0` and read the real address back before connecting.
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
    state: SharedState,
}

impl RelayServer {
    /// Binds the TCP listener for the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is already in use or the process lacks
    /// permission to bind.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<RelayServer> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;

        let state = registry::shared(DeviceMemory::new(config.memory_ttl));

        Ok(RelayServer {
            listener,
            config,
            state,
        })
    }

    /// The actual bound address (resolves port `0` to the assigned port).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket cannot report its address.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Shared state handle, exposed for tests that assert on registry
    /// contents while the server runs.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Runs the accept loop until `running` is cleared.
    ///
    /// On shutdown the heartbeat stops first, then every open connection is
    /// forcibly closed, then the listener is dropped.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("relay listening on {}", self.local_addr()?);

        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&self.state),
            self.config.heartbeat_interval,
            Arc::clone(&running),
        ));

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short timeout so the loop can poll the shutdown flag even when
            // no clients are connecting.
            match timeout(Duration::from_millis(200), self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    info!("new connection from {peer_addr}");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, state).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient accept failure (e.g. fd exhaustion); keep
                    // serving existing sessions.
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // Timeout: no connection in the last 200 ms.
                }
            }
        }

        // Orderly shutdown: heartbeat first, then force-close everything.
        heartbeat.abort();
        self.state.lock().await.terminate_all();
        info!("relay stopped");
        Ok(())
    }
}
