//! Device memory: per-device recall that outlives connections.
//!
//! Unlike the telemetry snapshot (which is purged when a room empties), the
//! device memory keeps the last-seen display name and route metadata for a
//! device id across full disconnections, so a returning driver's viewers see
//! the right label before the driver resends it.
//!
//! Retention is bounded by a time-to-live: entries untouched for longer than
//! the configured TTL are evicted by [`DeviceMemory::prune`], which the
//! server calls from its heartbeat sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Remembered metadata for one device id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRecord {
    pub display_name: Option<String>,
    pub route_id: Option<String>,
    pub direction: Option<String>,
}

struct Entry {
    record: DeviceRecord,
    last_seen: Instant,
}

/// Process-wide map of device id → remembered metadata.
pub struct DeviceMemory {
    entries: HashMap<String, Entry>,
    ttl: Duration,
}

impl DeviceMemory {
    /// Creates an empty memory whose entries expire `ttl` after last touch.
    pub fn new(ttl: Duration) -> DeviceMemory {
        DeviceMemory {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Merges newly declared fields for `device_id`, field-by-field.
    ///
    /// A field the message omitted keeps its previously known value; a field
    /// the message carries overwrites it. The entry's TTL clock restarts on
    /// every call, whether or not any field changed.
    pub fn remember(
        &mut self,
        device_id: &str,
        display_name: Option<&str>,
        route_id: Option<&str>,
        direction: Option<&str>,
    ) {
        self.remember_at(device_id, display_name, route_id, direction, Instant::now());
    }

    /// Time-injected form of [`remember`](Self::remember), for tests.
    pub fn remember_at(
        &mut self,
        device_id: &str,
        display_name: Option<&str>,
        route_id: Option<&str>,
        direction: Option<&str>,
        now: Instant,
    ) {
        let entry = self
            .entries
            .entry(device_id.to_string())
            .or_insert_with(|| Entry {
                record: DeviceRecord::default(),
                last_seen: now,
            });

        if let Some(name) = display_name {
            entry.record.display_name = Some(name.to_string());
        }
        if let Some(route) = route_id {
            entry.record.route_id = Some(route.to_string());
        }
        if let Some(dir) = direction {
            entry.record.direction = Some(dir.to_string());
        }
        entry.last_seen = now;
    }

    /// Returns the remembered record for `device_id`, if any.
    pub fn lookup(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.entries.get(device_id).map(|e| &e.record)
    }

    /// Evicts entries untouched for longer than the TTL. Returns the number
    /// of evicted devices.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_seen) <= ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("device memory: evicted {evicted} expired device(s)");
        }
        evicted
    }

    /// Number of devices currently remembered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
