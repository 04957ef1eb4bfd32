//! Client configuration.
//!
//! Built once (builder, YAML file, environment) and immutable afterwards.
//! Durations are expressed in milliseconds in files.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Which cache store backs the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    /// File-backed, survives restarts. Requires `cache.path`.
    Durable,
}

impl FromStr for CacheStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheStrategy::Memory),
            "durable" | "file" => Ok(CacheStrategy::Durable),
            other => Err(Error::configuration_with_context(
                format!("unknown cache strategy '{}'", other),
                ErrorContext::new().with_field_path("cache.strategy"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    #[serde(rename = "ttl_ms", with = "duration_ms")]
    pub ttl: Duration,
    pub strategy: CacheStrategy,
    /// Capacity of the in-memory store.
    pub max_entries: usize,
    /// File used by the durable store.
    pub path: Option<PathBuf>,
    /// Namespace prepended to derived keys.
    pub key_prefix: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(5 * 60),
            strategy: CacheStrategy::Memory,
            max_entries: 1000,
            path: None,
            key_prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefixed to relative request paths.
    pub base_url: Option<String>,
    /// Deadline for a single attempt.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base of the exponential backoff.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
    #[serde(rename = "max_retry_delay_ms", with = "duration_ms")]
    pub max_retry_delay: Duration,
    pub cache: CacheSettings,
    /// Sent with every request; per-call headers take precedence.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            cache: CacheSettings::default(),
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid client configuration: {}", e),
                ErrorContext::new().with_source("config_loader"),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read {}: {}", path.display(), e),
                ErrorContext::new().with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `API_CLIENT_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
            let raw = lookup(name)?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(var = name, value = raw.as_str(), "ignoring invalid override");
                    None
                }
            }
        }

        if let Some(url) = lookup("API_CLIENT_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "API_CLIENT_TIMEOUT_MS") {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parsed::<u32>(&lookup, "API_CLIENT_RETRIES") {
            self.retries = n;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "API_CLIENT_RETRY_DELAY_MS") {
            self.retry_delay = Duration::from_millis(ms);
        }
        if let Some(enabled) = parsed::<bool>(&lookup, "API_CLIENT_CACHE_ENABLED") {
            self.cache.enabled = enabled;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "API_CLIENT_CACHE_TTL_SECS") {
            self.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(strategy) = parsed::<CacheStrategy>(&lookup, "API_CLIENT_CACHE_STRATEGY") {
            self.cache.strategy = strategy;
        }
        if let Some(path) = lookup("API_CLIENT_CACHE_PATH") {
            self.cache.path = Some(PathBuf::from(path));
        }
        self
    }

    /// Check invariants that would otherwise fail on the first call.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref base) = self.base_url {
            let parsed = url::Url::parse(base).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid base_url '{}': {}", base, e),
                    ErrorContext::new().with_field_path("base_url"),
                )
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::configuration_with_context(
                    format!("base_url must be http(s), got '{}'", parsed.scheme()),
                    ErrorContext::new().with_field_path("base_url"),
                ));
            }
        }
        if self.timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "timeout must be greater than zero",
                ErrorContext::new().with_field_path("timeout_ms"),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> crate::resilience::RetryPolicy {
        crate::resilience::RetryPolicy::new(self.retries, self.retry_delay)
            .with_max_delay(self.max_retry_delay)
    }
}
