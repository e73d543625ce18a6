//! Error types for the response cache.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// A key extractor could not derive a cache key for the request.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExtractError {
    message: String,
}

impl ExtractError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An invalid backend connection locator.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid connection string: {0}")]
    InvalidLocator(#[from] url::ParseError),

    #[error("unknown protocol {0} - only \"redis\" allowed")]
    UnsupportedScheme(String),

    #[error("connection string has no host")]
    MissingHost,

    #[error(
        "database {0:?} is not a non-negative integer, expected e.g. redis://127.0.0.1:6379/4"
    )]
    InvalidDatabase(String),

    #[error("invalid cache configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A storage backend failed. "Not found" is never an error; it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis {op} failed: {source}")]
    Redis {
        op: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("redis {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("unexpected reply to {op}: {reply:?}")]
    UnexpectedReply { op: &'static str, reply: String },

    #[error("malformed cache record for key {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything that can go wrong on the cache path of a single request.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to capture response body: {0}")]
    Capture(#[source] io::Error),
}
