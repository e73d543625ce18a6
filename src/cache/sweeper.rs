//! Background expiry sweeping for [`MemoryStore`](super::MemoryStore).
//!
//! The sweeper is a Tokio task ticking on a fixed interval. Each pass scans
//! the map under the read lock, then removes expired keys in small batches
//! under the write lock so requests are never blocked for a whole pass.

use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::memory::Entries;

/// Keys removed per write-lock acquisition.
const SWEEP_BATCH: usize = 64;

/// Handle to a running sweeper task. Dropping it stops the task.
pub(crate) struct Sweeper {
    token: CancellationToken,
    _task: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns the sweeping loop on the current runtime.
    ///
    /// The task holds only a weak reference to the map, so it also exits on
    /// its own once the owning store is gone.
    pub(crate) fn spawn(entries: Weak<Entries>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            info!(interval = ?interval, "cache sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(entries) = entries.upgrade() else { break };
                        let removed = sweep(&entries, Utc::now()).await;
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                }
            }
            debug!("cache sweeper stopped");
        });

        Self {
            token,
            _task: task,
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Removes every entry that has expired at `now`; returns the number removed.
///
/// An entry that was re-saved with a later expiry between the scan and the
/// removal is kept.
pub(crate) async fn sweep(entries: &Entries, now: DateTime<Utc>) -> usize {
    let expired: Vec<String> = entries
        .read()
        .await
        .iter()
        .filter(|(_, entry)| entry.is_expired_at(now))
        .map(|(key, _)| key.clone())
        .collect();

    let mut removed = 0;
    for batch in expired.chunks(SWEEP_BATCH) {
        let mut map = entries.write().await;
        for key in batch {
            if map.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
                map.remove(key);
                removed += 1;
            }
        }
    }
    removed
}
