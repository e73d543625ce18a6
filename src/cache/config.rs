//! Startup configuration for the response cache.
//!
//! ```json
//! {
//!   "store": { "backend": "redis", "url": "redis://127.0.0.1:6379/0", "prefix": "app:" },
//!   "failure_policy": "bypass"
//! }
//! ```

use serde::Deserialize;

use super::{ConfigError, FailurePolicy};

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;
const DEFAULT_TIMEOUT_MS: u64 = 2000;

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Which backend to build and how.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory {
        /// Seconds between sweeps of expired entries; `0` disables sweeping.
        #[serde(default = "default_sweep_interval_secs")]
        sweep_interval_secs: u64,
    },
    Redis {
        url: String,
        #[serde(default)]
        prefix: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl CacheConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, an unknown backend or
    /// a missing required field.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_memory_with_fail_policy() {
        let config = CacheConfig::from_json("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.failure_policy, FailurePolicy::Fail);
        assert_eq!(
            config.store,
            StoreConfig::Memory {
                sweep_interval_secs: 5
            }
        );
    }

    #[test]
    fn redis_defaults_fill_in() {
        let config =
            CacheConfig::from_json(r#"{"store":{"backend":"redis","url":"redis://cache:6379/2"}}"#)
                .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://cache:6379/2".into(),
                prefix: String::new(),
                timeout_ms: 2000,
            }
        );
    }

    #[test]
    fn explicit_values_win() {
        let config = CacheConfig::from_json(
            r#"{"store":{"backend":"memory","sweep_interval_secs":0},"failure_policy":"bypass"}"#,
        )
        .unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Bypass);
        assert_eq!(
            config.store,
            StoreConfig::Memory {
                sweep_interval_secs: 0
            }
        );
    }

    #[test]
    fn rejects_unknown_backend_and_missing_url() {
        for json in [
            r#"{"store":{"backend":"memcached"}}"#,
            r#"{"store":{"backend":"redis"}}"#,
            r#"{"failure_policy":"retry"}"#,
        ] {
            assert!(matches!(
                CacheConfig::from_json(json),
                Err(ConfigError::Parse(_))
            ));
        }
    }
}
