//! Cache Configuration
//!
//! Construction options for the remote connection, the retry policy, the
//! circuit breaker and the in-process fallback store.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Configuration for a cache instance
///
/// All durations are stored as integers so the struct round-trips through
/// config files and environment variables unchanged. Use the accessor
/// methods (`ttl()`, `connection_timeout()`, ...) to get `Duration`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Full connection URL; overrides host/port/db/password when set
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db_index: i64,
    pub password: Option<String>,
    /// Upper bound on in-flight commands against the backend
    pub max_connections: usize,
    pub connection_timeout_s: u64,
    /// Per-command timeout
    pub socket_timeout_s: u64,
    pub health_check_interval_s: u64,
    /// TTL applied to every remote write
    pub ttl_s: u64,
    /// Additional attempts after the first failure
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Key prefix; keys are stored as `"{namespace}:{key}"`
    pub namespace: Option<String>,
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    pub reset_timeout_s: u64,
    pub local_max_size: usize,
    pub local_ttl_s: u64,
    /// `COUNT` hint for each `SCAN` batch in `clear_namespace`
    pub scan_batch_size: usize,
    /// Re-enable a disabled remote tier after this many seconds; `None` keeps it disabled
    pub remote_reenable_after_s: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 6379,
            db_index: 0,
            password: None,
            max_connections: 10,
            connection_timeout_s: 5,
            socket_timeout_s: 5,
            health_check_interval_s: 30,
            ttl_s: 3600,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
            namespace: None,
            failure_threshold: 5,
            reset_timeout_s: 30,
            local_max_size: 1000,
            local_ttl_s: 3600,
            scan_batch_size: 100,
            remote_reenable_after_s: None,
        }
    }
}

impl CacheConfig {
    /// Load configuration from the process environment over the defaults
    ///
    /// Recognized variables: `REDIS_URL`, `REDIS_HOST`, `REDIS_PORT`,
    /// `REDIS_DB`, `REDIS_PASSWORD`, `CACHE_TTL_S`, `CACHE_NAMESPACE`,
    /// `CACHE_MAX_RETRIES`.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("REDIS_URL") {
            config.url = Some(url);
        }
        if let Some(host) = lookup("REDIS_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "REDIS_PORT")? {
            config.port = port;
        }
        if let Some(db) = parse_var(&lookup, "REDIS_DB")? {
            config.db_index = db;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            config.password = Some(password);
        }
        if let Some(ttl) = parse_var(&lookup, "CACHE_TTL_S")? {
            config.ttl_s = ttl;
        }
        if let Some(namespace) = lookup("CACHE_NAMESPACE") {
            config.namespace = Some(namespace);
        }
        if let Some(retries) = parse_var(&lookup, "CACHE_MAX_RETRIES")? {
            config.max_retries = retries;
        }

        Ok(config)
    }

    /// Copy of this configuration scoped to `namespace`
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..self.clone()
        }
    }

    /// Check the configuration for values that cannot work
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] describing the first invalid field.
    pub fn validate(&self) -> CacheResult<()> {
        let invalid = |msg: &str| Err(CacheError::Config(msg.to_string()));

        if self.ttl_s == 0 {
            return invalid("ttl_s must be greater than 0");
        }
        if self.local_ttl_s == 0 {
            return invalid("local_ttl_s must be greater than 0");
        }
        if self.local_max_size == 0 {
            return invalid("local_max_size must be greater than 0");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be greater than 0");
        }
        if self.failure_threshold == 0 {
            return invalid("failure_threshold must be greater than 0");
        }
        if self.health_check_interval_s == 0 {
            return invalid("health_check_interval_s must be greater than 0");
        }
        if self.scan_batch_size == 0 {
            return invalid("scan_batch_size must be greater than 0");
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return invalid("initial_backoff_ms cannot exceed max_backoff_ms");
        }
        if let Some(namespace) = &self.namespace {
            validate_namespace(namespace)?;
        }
        Ok(())
    }

    /// Connection URL for the remote backend
    #[must_use]
    pub fn redis_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db_index
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db_index),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_s)
    }

    #[must_use]
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_s)
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_s)
    }

    #[must_use]
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_s)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_s)
    }

    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_s)
    }

    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn remote_reenable_after(&self) -> Option<Duration> {
        self.remote_reenable_after_s.map(Duration::from_secs)
    }
}

/// Characters a namespace may not contain
///
/// `:` separates the namespace from the key, so `jobs` would otherwise own
/// every key of `jobs:archive`; the rest are `SCAN MATCH` glob syntax.
const NAMESPACE_RESERVED: &[char] = &[':', '*', '?', '[', ']', '\\'];

/// Check that `namespace` can only ever match its own keys
///
/// # Errors
///
/// Returns [`CacheError::Config`] if the namespace contains `:` or a glob
/// metacharacter.
pub fn validate_namespace(namespace: &str) -> CacheResult<()> {
    match namespace.chars().find(|c| NAMESPACE_RESERVED.contains(c)) {
        Some(c) => Err(CacheError::Config(format!(
            "namespace {namespace:?} contains reserved character {c:?}"
        ))),
        None => Ok(()),
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {name}: {raw:?}"))
        })
        .transpose()
}
