//! Liveness supervision.
//!
//! A single task sweeps every tracked connection on a fixed interval. The
//! sweep terminates peers that never answered the previous ping (half-open
//! sockets after network loss would otherwise leak room membership
//! indefinitely) and pings everyone else; a peer's pong re-arms its flag in
//! the session loop. The same tick evicts expired device-memory entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info};

use crate::application::registry::SharedState;

/// Runs the heartbeat sweep until the shutdown flag clears.
///
/// Terminated peers are not removed here: dropping their socket makes each
/// session loop exit and clean up through the normal close path.
pub async fn run_heartbeat(state: SharedState, period: Duration, running: Arc<AtomicBool>) {
    let mut ticker = interval(period);
    // The first tick resolves immediately; skip it so a sweep never runs
    // before any peer had a chance to pong.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !running.load(Ordering::Relaxed) {
            debug!("heartbeat: shutdown flag set, stopping");
            break;
        }

        let mut st = state.lock().await;
        let (pinged, terminated) = st.liveness_sweep();
        let evicted = st.prune_memory(Instant::now());
        drop(st);

        if terminated > 0 {
            info!("heartbeat: terminated {terminated} unresponsive connection(s)");
        }
        debug!("heartbeat: pinged {pinged}, terminated {terminated}, evicted {evicted}");
    }
}
