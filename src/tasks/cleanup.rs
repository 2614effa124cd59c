//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of the
//! in-memory store. Expired entries are already invisible to readers; the
//! sweep only reclaims their memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::MemoryStore;

/// Spawns the expiry sweep, first run one interval after start.
///
/// Abort the returned handle on shutdown.
pub fn spawn_cleanup_task(store: Arc<MemoryStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "TTL cleanup task started");

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let removed = store.cleanup_expired().await;
            if removed == 0 {
                debug!("TTL sweep found nothing to remove");
                continue;
            }
            let remaining = store.len().await;
            info!(removed, remaining, "TTL sweep removed expired entries");
        }
    })
}
