//! In-process cache backend.
//!
//! Entries live in a `HashMap` behind a Tokio reader/writer lock: lookups
//! share the lock, saves and deletes take it exclusively. Nothing survives a
//! process restart and nothing is shared between processes; use the Redis
//! backend for that.
//!
//! Expired entries are never returned. When a sweep interval is configured a
//! background task also removes them so memory is reclaimed; with a zero
//! interval they stay resident until overwritten or deleted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::sweeper::{self, Sweeper};
use super::{CacheEntry, Store, StoreError};

pub(crate) type Entries = RwLock<HashMap<String, CacheEntry>>;

/// In-memory [`Store`] with optional background expiry sweeping.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use rttp_cache::cache::MemoryStore;
///
/// # #[tokio::main] async fn main() {
/// // Sweep expired entries every five seconds.
/// let store = MemoryStore::new(Duration::from_secs(5));
/// assert!(store.is_empty().await);
/// # }
/// ```
pub struct MemoryStore {
    entries: Arc<Entries>,
    sweep_interval: Duration,
    // Cancels the background task when the store is dropped.
    _sweeper: Option<Sweeper>,
}

impl MemoryStore {
    /// Creates an empty store.
    ///
    /// A non-zero `sweep_interval` spawns the sweeper on the current Tokio
    /// runtime, so it must then be called from within one.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries = Arc::new(Entries::default());
        let sweeper = (!sweep_interval.is_zero())
            .then(|| Sweeper::spawn(Arc::downgrade(&entries), sweep_interval));
        Self {
            entries,
            sweep_interval,
            _sweeper: sweeper,
        }
    }

    /// The configured sweep interval; zero means sweeping is disabled.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Number of physically stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Removes every entry that has expired by now and returns how many went.
    pub async fn purge_expired(&self) -> usize {
        sweeper::sweep(&self.entries, Utc::now()).await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save(&self, key: &str, mut entry: CacheEntry) -> Result<(), StoreError> {
        entry.key = key.to_owned();
        entry.created_at.get_or_insert_with(Utc::now);
        self.entries.write().await.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
