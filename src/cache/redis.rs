//! Redis cache backend.
//!
//! Survives process restarts and lets several server processes share one
//! cache. Each entry is stored as a hash under `prefix + key` with the fields
//! `key`, `body`, `status`, `contentType`, `createdAt` and `expiresAt`; the
//! timestamps are HTTP-dates. Redis itself expires the hash at `expiresAt`
//! (`EXPIREAT`), so there is no sweeper.
//!
//! Every command is bounded by the store's operation timeout; dropping the
//! returned future cancels it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use tracing::{debug, info};
use url::Url;

use super::{CacheEntry, ConfigError, Store, StoreError};
use crate::StatusCode;
use crate::http::date::{fmt_http_date, parse_http_date};

/// Redis running on localhost without a password, database 0.
pub const DEFAULT_CONNECTION_STRING: &str = "redis://127.0.0.1:6379/0";

/// Default bound on a single Redis round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_PORT: u16 = 6379;

/// A parsed `redis://[:password@]host:port[/db]` locator.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::redis::ConnectionOptions;
///
/// let options: ConnectionOptions = "redis://:s3cret@cache.internal:6380/4".parse().unwrap();
/// assert_eq!(options.host, "cache.internal");
/// assert_eq!(options.port, 6380);
/// assert_eq!(options.password.as_deref(), Some("s3cret"));
/// assert_eq!(options.db, 4);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl ConnectionOptions {
    /// Parses a connection locator. Only the `redis` scheme is accepted; a
    /// missing database segment selects database 0.
    pub fn parse(locator: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(locator)?;
        if url.scheme() != "redis" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_owned()));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or(ConfigError::MissingHost)?
            .to_owned();

        let db = match url.path().trim_start_matches('/') {
            "" => 0,
            segment => segment
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidDatabase(segment.to_owned()))?,
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            password: url.password().map(str::to_owned),
            db,
        })
    }

    // Canonical form handed to the redis client. The password is still
    // percent-encoded as it came out of the URL parser.
    fn to_client_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl FromStr for ConnectionOptions {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

/// Redis-backed [`Store`].
pub struct RedisStore {
    prefix: String,
    timeout: Duration,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects using a locator string and the default operation timeout.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] for a bad locator; otherwise a connection or
    /// timeout error if the server does not answer `PING` with `PONG`.
    pub async fn connect(locator: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        Self::connect_with(ConnectionOptions::parse(locator)?, prefix, DEFAULT_TIMEOUT).await
    }

    /// Connects with explicit options and operation timeout.
    pub async fn connect_with(
        options: ConnectionOptions,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::open(options.to_client_url())
            .map_err(|source| StoreError::Redis { op: "open", source })?;
        let conn = bounded("connect", timeout, ConnectionManager::new(client)).await?;

        let store = Self {
            prefix: prefix.into(),
            timeout,
            conn,
        };

        let pong: String = store
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if pong != "PONG" {
            return Err(StoreError::UnexpectedReply {
                op: "PING",
                reply: pong,
            });
        }

        info!(host = %options.host, port = options.port, db = options.db, prefix = %store.prefix, "redis cache connected");
        Ok(store)
    }

    /// The namespace prepended to every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T, StoreError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        bounded(op, self.timeout, command(self.conn.clone())).await
    }
}

async fn bounded<T>(
    op: &'static str,
    after: Duration,
    fut: impl Future<Output = RedisResult<T>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(|source| StoreError::Redis { op, source }),
        Err(_) => Err(StoreError::Timeout { op, after }),
    }
}

/// Field/value pairs written for an entry.
fn encode(key: &str, entry: &CacheEntry) -> Vec<(&'static str, Vec<u8>)> {
    let created_at = entry.created_at.unwrap_or_else(Utc::now);
    vec![
        ("key", key.as_bytes().to_vec()),
        ("body", entry.body.to_vec()),
        ("status", entry.status.as_u16().to_string().into_bytes()),
        ("contentType", entry.content_type.clone().into_bytes()),
        ("createdAt", fmt_http_date(created_at).into_bytes()),
        ("expiresAt", fmt_http_date(entry.expires_at).into_bytes()),
    ]
}

/// Rebuilds an entry from a `HGETALL` reply. `key` is the unprefixed key, used
/// only for error reporting.
fn decode(key: &str, mut raw: HashMap<String, Vec<u8>>) -> Result<CacheEntry, StoreError> {
    let malformed = |reason: String| StoreError::Malformed {
        key: key.to_owned(),
        reason,
    };

    let mut field = |name: &'static str| {
        raw.remove(name)
            .ok_or_else(|| format!("missing field {name}"))
    };
    let mut text = |name: &'static str| {
        field(name).and_then(|bytes| {
            String::from_utf8(bytes).map_err(|_| format!("field {name} is not UTF-8"))
        })
    };

    let stored_key = text("key").map_err(malformed)?;
    let content_type = text("contentType").map_err(malformed)?;
    let status = text("status").map_err(malformed)?;
    let created_at = text("createdAt").map_err(malformed)?;
    let expires_at = text("expiresAt").map_err(malformed)?;
    let body = raw
        .remove("body")
        .ok_or_else(|| malformed("missing field body".into()))?;

    let status = status
        .parse::<u16>()
        .ok()
        .and_then(StatusCode::from_u16)
        .ok_or_else(|| malformed(format!("unsupported status {status:?}")))?;
    let created_at = parse_http_date(&created_at)
        .map_err(|e| malformed(format!("createdAt {created_at:?}: {e}")))?;
    let expires_at = parse_http_date(&expires_at)
        .map_err(|e| malformed(format!("expiresAt {expires_at:?}: {e}")))?;

    Ok(CacheEntry {
        key: stored_key,
        body: Bytes::from(body),
        status,
        content_type,
        created_at: Some(created_at),
        expires_at,
    })
}

#[async_trait]
impl Store for RedisStore {
    async fn save(&self, key: &str, mut entry: CacheEntry) -> Result<(), StoreError> {
        entry.created_at.get_or_insert_with(Utc::now);
        let prefixed = self.prefixed(key);

        let mut hset = redis::cmd("HSET");
        hset.arg(&prefixed);
        for (name, value) in encode(key, &entry) {
            hset.arg(name).arg(value);
        }
        let mut expire = redis::cmd("EXPIREAT");
        expire.arg(&prefixed).arg(entry.expires_at.timestamp());

        let mut pipe = redis::pipe();
        pipe.atomic()
            .add_command(hset)
            .ignore()
            .add_command(expire)
            .ignore();

        self.run("HSET", |mut conn| async move {
            pipe.query_async::<()>(&mut conn).await
        })
        .await?;
        debug!(key = %prefixed, "redis cache entry saved");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let prefixed = self.prefixed(key);
        let raw: HashMap<String, Vec<u8>> = self
            .run("HGETALL", |mut conn| async move {
                redis::cmd("HGETALL")
                    .arg(&prefixed)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        if raw.is_empty() {
            return Ok(None);
        }

        let entry = decode(key, raw)?;
        // EXPIREAT has second granularity; never hand out a stale entry.
        Ok((!entry.is_expired_at(Utc::now())).then_some(entry))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let prefixed = self.prefixed(key);
        self.run("DEL", |mut conn| async move {
            redis::cmd("DEL").arg(&prefixed).query_async::<()>(&mut conn).await
        })
        .await
    }
}
