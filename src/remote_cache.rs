//! Remote Cache
//!
//! Namespaced get/set/delete/clear against the remote backend, with retry,
//! exponential backoff and ±20% jitter. All public operations are
//! best-effort: they log and return `None`/`false` instead of failing.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::codecs::{CacheValue, JsonCodec};
use crate::config::{CacheConfig, validate_namespace};
use crate::connection::ConnectionManager;
use crate::error::{CacheError, CacheResult};
use crate::key::{KeyArgs, generate_key};
use crate::traits::{Cache, RemoteConnection, RemoteTier};

/// Retry schedule for remote reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Un-jittered backoff before retry number `retry` (0-based)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// `backoff` scaled by a uniform factor in `[0.8, 1.2]`
    #[must_use]
    pub fn jittered(backoff: Duration) -> Duration {
        backoff.mul_f64(rand::thread_rng().gen_range(0.8..=1.2))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Cache over the remote backend, scoped to an optional namespace
pub struct RemoteCache {
    connections: Arc<ConnectionManager>,
    codec: JsonCodec,
    namespace: Option<String>,
    ttl: Duration,
    retry: RetryPolicy,
    scan_batch_size: usize,
    errors: AtomicU64,
}

impl RemoteCache {
    /// Cache scoped to `config.namespace`; an empty namespace means unscoped
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the namespace contains `:` or a glob
    /// metacharacter, since `clear_namespace` could then reach other
    /// namespaces' keys.
    pub fn new(connections: Arc<ConnectionManager>, config: &CacheConfig) -> CacheResult<Self> {
        let namespace = config.namespace.clone().filter(|ns| !ns.is_empty());
        if let Some(ns) = &namespace {
            validate_namespace(ns)?;
        }

        Ok(Self {
            connections,
            codec: JsonCodec,
            namespace,
            ttl: config.ttl(),
            retry: RetryPolicy::from_config(config),
            scan_batch_size: config.scan_batch_size.max(1),
            errors: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Key as stored on the backend: `"{namespace}:{key}"`, or `key` unscoped
    #[must_use]
    pub fn namespaced_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key.to_string(),
        }
    }

    /// Run `op` against a fresh connection, retrying transient failures
    ///
    /// `CircuitOpen` ends the loop at once; any non-retryable error is
    /// returned as-is; retryable ones are retried `max_retries` times.
    async fn with_retry<T, F, Fut>(&self, command: &'static str, key: &str, mut op: F) -> CacheResult<T>
    where
        F: FnMut(Arc<dyn RemoteConnection>) -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
        T: Send,
    {
        let mut retries = 0;

        loop {
            let result = match self.connections.get_connection() {
                Ok(conn) => op(conn).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(CacheError::CircuitOpen) => {
                    debug!(command, key = %key, "Circuit open, skipping remote call");
                    return Err(CacheError::CircuitOpen);
                }
                Err(e) if e.is_retryable() && retries < self.retry.max_retries => {
                    let delay = RetryPolicy::jittered(self.retry.backoff(retries));
                    retries += 1;
                    warn!(
                        command,
                        key = %key,
                        error = %e,
                        attempt = retries,
                        delay_ms = delay.as_millis(),
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(command, key = %key, error = %e, attempts = retries + 1, "Remote call failed, retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Read a value, reporting why a read could not be served
    ///
    /// A payload that fails to decode is treated as corrupt: it is deleted
    /// and reported as a miss.
    ///
    /// # Errors
    ///
    /// `CircuitOpen`, `NotInitialized`, or the last transient error once
    /// retries are exhausted.
    pub async fn try_get(&self, key: &str) -> CacheResult<Option<Value>> {
        let full_key = self.namespaced_key(key);
        let full_key_ref = full_key.as_str();

        let raw = self
            .with_retry("GET", full_key_ref, |conn| async move {
                conn.get(full_key_ref).await
            })
            .await?;

        let Some(raw) = raw else {
            debug!(key = %full_key, "[Remote] Miss");
            return Ok(None);
        };

        match self.codec.decode(&raw) {
            Ok(value) => {
                debug!(key = %full_key, "[Remote] Hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Corrupted cache entry, deleting");
                self.delete(key).await;
                Ok(None)
            }
        }
    }

    /// Read a value; `None` on miss or on any failure
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Remote get degraded to miss");
                None
            }
        }
    }

    /// Write an encoded payload with the configured TTL
    ///
    /// # Errors
    ///
    /// Same conditions as [`try_get`](Self::try_get).
    async fn write_encoded(&self, key: &str, payload: &[u8]) -> CacheResult<()> {
        let full_key = self.namespaced_key(key);
        let full_key_ref = full_key.as_str();
        let ttl = self.ttl;

        self.with_retry("SETEX", full_key_ref, |conn| async move {
            conn.set_ex(full_key_ref, payload, ttl).await
        })
        .await?;

        debug!(key = %full_key, ttl_secs = ttl.as_secs(), "[Remote] Stored");
        Ok(())
    }

    /// Encode and write a value, reporting failures
    ///
    /// Encoding failures return immediately without touching the backend.
    ///
    /// # Errors
    ///
    /// `Serialization` for unencodable values, otherwise as [`try_get`](Self::try_get).
    pub async fn try_set(&self, key: &str, value: &CacheValue) -> CacheResult<()> {
        let payload = self.codec.encode(value)?;
        self.write_encoded(key, &payload).await
    }

    /// Write a value; `true` on success
    pub async fn set(&self, key: &str, value: impl Into<CacheValue>) -> bool {
        match self.try_set(key, &value.into()).await {
            Ok(()) => true,
            Err(CacheError::Serialization(e)) => {
                error!(key = %key, error = %e, "Value cannot be encoded, not caching");
                false
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Remote set failed");
                false
            }
        }
    }

    /// Delete a key with a single attempt; `false` on any failure
    pub async fn delete(&self, key: &str) -> bool {
        let full_key = self.namespaced_key(key);
        let conn = match self.connections.get_connection() {
            Ok(conn) => conn,
            Err(e) => {
                debug!(key = %full_key, error = %e, "Remote delete skipped");
                return false;
            }
        };

        match conn.del(std::slice::from_ref(&full_key)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Remote delete failed");
                false
            }
        }
    }

    /// Delete every key under this cache's namespace
    ///
    /// Walks `SCAN {namespace}:*` in batches, deleting each batch, until the
    /// cursor returns to 0. Refuses to run without a namespace.
    pub async fn clear_namespace(&self) -> bool {
        let Some(namespace) = &self.namespace else {
            warn!("clear_namespace called on a cache without a namespace");
            return false;
        };
        let pattern = format!("{namespace}:*");

        let conn = match self.connections.get_connection() {
            Ok(conn) => conn,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Cannot clear namespace");
                return false;
            }
        };

        let mut cursor = 0;
        let mut removed = 0;
        loop {
            let (next, keys) = match conn.scan(cursor, &pattern, self.scan_batch_size).await {
                Ok(step) => step,
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "SCAN failed while clearing namespace");
                    return false;
                }
            };

            if !keys.is_empty() {
                match conn.del(&keys).await {
                    Ok(count) => removed += count,
                    Err(e) => {
                        error!(namespace = %namespace, error = %e, "DEL failed while clearing namespace");
                        return false;
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(namespace = %namespace, removed, "[Remote] Cleared namespace");
        true
    }

    #[must_use]
    pub fn generate_key(&self, args: &KeyArgs) -> String {
        generate_key(args)
    }
}

#[async_trait]
impl RemoteTier for RemoteCache {
    async fn fetch(&self, key: &str) -> CacheResult<Option<Value>> {
        self.try_get(key).await
    }

    async fn store(&self, key: &str, value: &Value) -> CacheResult<()> {
        let payload = self.codec.encode(value)?;
        self.write_encoded(key, &payload).await
    }
}

#[async_trait]
impl Cache for RemoteCache {
    async fn get(&self, key: &str) -> Option<Value> {
        RemoteCache::get(self, key).await
    }

    async fn set(&self, key: &str, value: CacheValue) -> bool {
        RemoteCache::set(self, key, value).await
    }

    fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "Remote"
    }
}
