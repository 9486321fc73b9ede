//! Per-driver telemetry rate limiting.
//!
//! A classic token bucket with *continuous* refill: tokens accrue in
//! proportion to elapsed wall-clock time rather than on a fixed tick, so a
//! driver publishing at exactly the refill rate is never throttled, while a
//! flood is clipped to the refill rate after an initial burst of at most
//! [`CAPACITY`] messages.
//!
//! Refusal carries no reply — the caller drops the message silently and logs
//! it server-side. There is no queueing.

use std::time::Instant;

/// Maximum tokens the bucket can hold (bounds the burst size).
pub const CAPACITY: f64 = 5.0;

/// Tokens restored per second of elapsed time.
pub const REFILL_PER_SEC: f64 = 5.0;

/// A continuous-refill token bucket. One per driver connection.
///
/// The bucket starts full, so a freshly connected driver can publish an
/// immediate burst of [`CAPACITY`] messages.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_touched: Instant,
}

impl TokenBucket {
    /// Creates a full bucket anchored at the current instant.
    pub fn new() -> TokenBucket {
        TokenBucket::anchored_at(Instant::now())
    }

    /// Creates a full bucket anchored at `now`. Exposed for deterministic
    /// tests that drive time explicitly.
    pub fn anchored_at(now: Instant) -> TokenBucket {
        TokenBucket {
            tokens: CAPACITY,
            last_touched: now,
        }
    }

    /// Attempts to consume one token at the current instant.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Attempts to consume one token at `now`.
    ///
    /// Tokens are first topped up by `elapsed_seconds * REFILL_PER_SEC`
    /// (capped at [`CAPACITY`]), then one token is consumed if at least one
    /// is available. Returns `false` when the message should be dropped.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_touched).as_secs_f64();
        self.tokens = (self.tokens + elapsed * REFILL_PER_SEC).min(CAPACITY);
        self.last_touched = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count, for diagnostics.
    pub fn available(&self) -> f64 {
        self.tokens
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        TokenBucket::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
