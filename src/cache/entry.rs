use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use crate::StatusCode;

/// One cached response.
///
/// `expires_at` is `created_at + ttl` for the ttl the extractor returned when
/// the response was captured. An entry whose `expires_at` has passed is
/// treated as absent by every backend, whether or not it has been purged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Key the entry was saved under. Stamped by [`Store::save`](super::Store::save).
    pub key: String,
    pub body: Bytes,
    pub status: StatusCode,
    /// Replayed as the `Content-Type` header; empty when the response had none.
    pub content_type: String,
    /// Capture time. Backends stamp the save time when left unset.
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Returns `true` once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Computes `now + ttl`, saturating at the latest representable instant.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
