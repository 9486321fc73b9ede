//! Relay configuration.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is a plain struct: no global state and no environment-variable reads
//! here — the binary populates it from CLI args (with env fallbacks), and
//! tests construct it directly.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The address and port the WebSocket listener binds to.
    ///
    /// Port `0` asks the OS for an ephemeral port; integration tests use
    /// this together with [`local_addr`](crate::infrastructure::RelayServer::local_addr).
    pub bind_addr: SocketAddr,

    /// Interval between liveness sweeps.
    ///
    /// Each sweep terminates connections that failed to answer the previous
    /// ping and sends a fresh ping to everyone else. Half-open sockets are
    /// therefore detected within two intervals.
    pub heartbeat_interval: Duration,

    /// How long remembered display-name/route metadata survives without any
    /// message from its device. Expired entries are evicted during the
    /// heartbeat sweep.
    pub memory_ttl: Duration,
}

impl Default for RelayConfig {
    /// Returns a `RelayConfig` suitable for local development.
    ///
    /// | Field              | Default        |
    /// |--------------------|----------------|
    /// | bind_addr          | `0.0.0.0:8080` |
    /// | heartbeat_interval | 30 seconds     |
    /// | memory_ttl         | 24 hours       |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address string.
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            heartbeat_interval: Duration::from_secs(30),
            memory_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_8080() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn test_default_heartbeat_is_30s() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_default_memory_ttl_is_24h() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.memory_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_config_can_be_cloned() {
        // Cloneability is required so the config can be shared across the
        // accept loop and the heartbeat task.
        let cfg = RelayConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.bind_addr, cloned.bind_addr);
        assert_eq!(cfg.heartbeat_interval, cloned.heartbeat_interval);
    }
}
