//! Response caching.
//!
//! [`CacheMiddleware`] implements the cache-aside pattern in front of any
//! handler: a [`KeyExtractor`] names the entry for a request, a [`Store`]
//! holds captured responses until they expire, and a [`Capture`] tees the
//! handler's body into the entry while it is written to the client.
//!
//! Two stores ship with the crate: [`MemoryStore`] for a single process and
//! [`RedisStore`] for a shared cache. [`Backend`] picks one from a
//! [`CacheConfig`] at startup.

pub mod capture;
pub mod config;
pub mod entry;
pub mod error;
pub mod extract;
pub mod memory;
pub mod middleware;
pub mod redis;
pub mod store;
mod sweeper;

pub use capture::Capture;
pub use config::{CacheConfig, StoreConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, ConfigError, ExtractError, StoreError};
pub use extract::{KeyExtractor, Principal, by_client, by_path};
pub use memory::MemoryStore;
pub use middleware::{CacheMiddleware, FailurePolicy};
pub use self::redis::RedisStore;
pub use store::{Backend, Store};
