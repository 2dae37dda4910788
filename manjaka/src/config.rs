//! Client configuration.
//!
//! [`ClientConfig`] gathers every tunable of the coordination layer. It can be
//! built in code, deserialized from YAML, or read from the environment:
//!
//! ```
//! use manjaka::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::from_yaml(r#"
//! base_url: "https://finance.example.org/api"
//! timeout: 20s
//! concurrency: 4
//! retry:
//!   max_retries: 2
//!   base_delay: 500ms
//! cache:
//!   resources:
//!     budgets: static
//! "#).unwrap();
//!
//! assert_eq!(config.timeout, Duration::from_secs(20));
//! assert_eq!(config.max_concurrent(), 4);
//! assert_eq!(config.retry.rate_limit_delay, Duration::from_secs(5));
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use bounded_integer::bounded_integer;
use manjaka_cache::TtlClass;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "MANJAKA_API_URL";

/// Concurrent request cap used when none is configured.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

bounded_integer! {
    /// Maximum number of simultaneous outbound requests (1-255).
    #[repr(u8)]
    pub struct ConcurrencyLimit { 1..=255 }
}

/// Error raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("invalid configuration: {0}")]
    Yaml(String),

    /// A configuration value is out of range or malformed.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Retry and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Delay after a 429 without `Retry-After`.
    #[serde(with = "humantime_serde")]
    pub rate_limit_delay: Duration,
    /// Upper bound of the exponential schedule.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Single-flight lock settings.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    /// How long a settled lock keeps absorbing late callers.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// Age after which a lock is considered stuck and replaced.
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(100),
            lock_timeout: Duration::from_secs(30),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL of [`TtlClass::Static`] resources.
    #[serde(with = "humantime_serde")]
    pub static_ttl: Duration,
    /// TTL of [`TtlClass::Default`] resources.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// TTL of [`TtlClass::Dynamic`] resources.
    #[serde(with = "humantime_serde")]
    pub dynamic_ttl: Duration,
    /// Period of the background sweep.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Resource name to TTL class; unlisted resources use `default`.
    pub resources: BTreeMap<String, TtlClass>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let resources = [
            ("comptes", TtlClass::Static),
            ("categories", TtlClass::Static),
            ("sous-categories", TtlClass::Static),
            ("transactions", TtlClass::Dynamic),
            ("transferts", TtlClass::Dynamic),
            ("stats", TtlClass::Dynamic),
        ]
        .into_iter()
        .map(|(name, class)| (name.to_string(), class))
        .collect();

        Self {
            static_ttl: TtlClass::Static.default_ttl(),
            default_ttl: TtlClass::Default.default_ttl(),
            dynamic_ttl: TtlClass::Dynamic.default_ttl(),
            cleanup_interval: Duration::from_secs(10 * 60),
            resources,
        }
    }
}

impl CacheConfig {
    /// TTL configured for a class.
    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Static => self.static_ttl,
            TtlClass::Default => self.default_ttl,
            TtlClass::Dynamic => self.dynamic_ttl,
        }
    }

    /// TTL class of a resource.
    pub fn class_of(&self, resource: Option<&str>) -> TtlClass {
        resource
            .and_then(|name| self.resources.get(name))
            .copied()
            .unwrap_or_default()
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `https://finance.example.org/api`.
    pub base_url: String,
    /// Login entry point the user is sent to when the session is rejected.
    pub login_path: String,
    /// Backend endpoint exchanging credentials for a session.
    pub login_endpoint: String,
    /// Per-attempt transport timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Simultaneous request cap. Defaults to 10.
    pub concurrency: Option<ConcurrencyLimit>,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Single-flight settings.
    pub lock: LockConfig,
    /// Cache settings.
    pub cache: CacheConfig,
    /// Resources whose cached reads go stale when the key resource is mutated.
    pub invalidation: BTreeMap<String, Vec<String>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let invalidation = [
            ("transactions", vec!["stats", "comptes"]),
            ("transferts", vec!["comptes", "transactions", "stats"]),
            ("sous-categories", vec!["categories"]),
            ("categories", vec!["sous-categories"]),
        ]
        .into_iter()
        .map(|(name, related)| {
            (
                name.to_string(),
                related.into_iter().map(str::to_string).collect(),
            )
        })
        .collect();

        Self {
            base_url: "http://localhost:5000/api".to_string(),
            login_path: "/login".to_string(),
            login_endpoint: "/auth/login".to_string(),
            timeout: Duration::from_secs(30),
            concurrency: None,
            retry: RetryConfig::default(),
            lock: LockConfig::default(),
            cache: CacheConfig::default(),
            invalidation,
        }
    }
}

impl ClientConfig {
    /// Parses a YAML document. Missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig =
            serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with the base URL taken from `MANJAKA_API_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            config.base_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid {
                field: "retry.base_delay",
                reason: format!(
                    "{:?} exceeds retry.max_delay {:?}",
                    self.retry.base_delay, self.retry.max_delay
                ),
            });
        }
        Ok(())
    }

    /// Effective concurrent request cap.
    pub fn max_concurrent(&self) -> usize {
        self.concurrency
            .map_or(DEFAULT_MAX_CONCURRENT, |limit| usize::from(limit.get()))
    }

    /// Sets the base URL.
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Sets the concurrent request cap.
    pub fn with_concurrency(self, limit: ConcurrencyLimit) -> Self {
        Self {
            concurrency: Some(limit),
            ..self
        }
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Replaces the retry settings.
    pub fn with_retry(self, retry: RetryConfig) -> Self {
        Self { retry, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_concurrent(), 10);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.lock.grace_period, Duration::from_millis(100));
        assert_eq!(config.cache.class_of(Some("comptes")), TtlClass::Static);
        assert_eq!(config.cache.class_of(Some("transactions")), TtlClass::Dynamic);
        assert_eq!(config.cache.class_of(Some("membres")), TtlClass::Default);
        assert_eq!(config.cache.class_of(None), TtlClass::Default);
    }

    #[test]
    fn test_yaml_overrides() {
        let config = ClientConfig::from_yaml(
            r#"
base_url: "https://finance.example.org/api"
lock:
  grace_period: 250ms
cache:
  dynamic_ttl: 30s
  resources:
    transactions: default
"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://finance.example.org/api");
        assert_eq!(config.lock.grace_period, Duration::from_millis(250));
        assert_eq!(config.lock.lock_timeout, Duration::from_secs(30));
        assert_eq!(config.cache.ttl(TtlClass::Dynamic), Duration::from_secs(30));
        assert_eq!(config.cache.class_of(Some("transactions")), TtlClass::Default);
    }

    #[test]
    fn test_out_of_range_concurrency_is_rejected() {
        assert!(ClientConfig::from_yaml("concurrency: 0").is_err());
        assert!(ClientConfig::from_yaml("concurrency: 300").is_err());
    }

    #[test]
    fn test_validate_delays() {
        let config = ClientConfig::default().with_retry(RetryConfig {
            base_delay: Duration::from_secs(60),
            ..RetryConfig::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "retry.base_delay", .. })
        ));
    }
}
