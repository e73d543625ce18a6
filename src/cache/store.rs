use std::sync::Arc;

use async_trait::async_trait;

use super::config::StoreConfig;
use super::redis::ConnectionOptions;
use super::{CacheEntry, MemoryStore, RedisStore, StoreError};

/// A key/value store for cached responses.
///
/// Implementations must be safe to share across concurrently running
/// requests. Saving an entry overwrites whatever was stored under the same
/// key; concurrent saves are last-write-wins.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upserts `entry` under `key`.
    ///
    /// The stored entry has `key` recorded on it and `created_at` stamped with
    /// the current time if the caller left it unset.
    async fn save(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError>;

    /// Fetches the entry under `key`.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored entry has
    /// already expired.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Removes the entry under `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn save(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
        (**self).save(key, entry).await
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// The built-in backends, selected at startup from a [`StoreConfig`].
pub enum Backend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl Backend {
    /// Builds the backend described by `config`.
    ///
    /// The memory variant must be created inside a Tokio runtime when
    /// sweeping is enabled.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Config`] for an unusable connection locator, or
    /// with a connection error when the Redis server cannot be reached.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match config {
            StoreConfig::Memory { sweep_interval_secs } => Ok(Self::Memory(MemoryStore::new(
                std::time::Duration::from_secs(*sweep_interval_secs),
            ))),
            StoreConfig::Redis {
                url,
                prefix,
                timeout_ms,
            } => {
                let options: ConnectionOptions = url.parse()?;
                let store = RedisStore::connect_with(
                    options,
                    prefix.clone(),
                    std::time::Duration::from_millis(*timeout_ms),
                )
                .await?;
                Ok(Self::Redis(store))
            }
        }
    }
}

#[async_trait]
impl Store for Backend {
    async fn save(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.save(key, entry).await,
            Self::Redis(store) => store.save(key, entry).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }
}
