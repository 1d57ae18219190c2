//! Local Cache - In-Process TTL Store
//!
//! Bounded key/value store used on its own or as the hybrid cache's
//! fallback tier. One lock guards the whole map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codecs::{CacheValue, JsonCodec};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::key::{KeyArgs, generate_key};
use crate::traits::Cache;

/// Cache entry with its write time
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    /// Write order, breaks ties between equal `stored_at`
    seq: u64,
}

/// In-process cache with TTL and batch eviction
///
/// An entry is visible while `now - stored_at <= ttl`; expired entries are
/// dropped when looked up. When a write pushes the size above `max_size`,
/// the oldest half of the entries is evicted in one pass.
///
/// Values are normalized through the JSON codec on the way in, so what a
/// caller reads back has the same shape as a remote read.
#[derive(Debug)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_size: usize,
    ttl: Duration,
    codec: JsonCodec,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalCache {
    /// Create a cache holding at most `max_size` entries for `ttl`
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for a zero capacity or zero TTL.
    pub fn new(max_size: usize, ttl: Duration) -> CacheResult<Self> {
        if max_size == 0 {
            return Err(CacheError::Config(
                "local cache max_size must be greater than 0".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(CacheError::Config(
                "local cache ttl must be greater than 0".to_string(),
            ));
        }

        info!(max_size, ttl_secs = ttl.as_secs_f64(), "Initializing local cache");

        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            max_size,
            ttl,
            codec: JsonCodec,
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for a zero capacity or zero TTL.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        Self::new(config.local_max_size, config.local_ttl())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
            debug!(key = %key, "[Local] Expired entry removed");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value; `false` if it cannot be encoded
    pub fn set(&self, key: &str, value: impl Into<CacheValue>) -> bool {
        match self.codec.to_value(&value.into()) {
            Ok(json) => {
                self.insert(key, json);
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "[Local] Value cannot be encoded, not caching");
                false
            }
        }
    }

    /// Store an already-normalized JSON value
    pub fn insert(&self, key: &str, value: Value) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), entry);
        if entries.len() > self.max_size {
            self.evict_oldest_half(&mut entries);
        }
    }

    fn evict_oldest_half(&self, entries: &mut HashMap<String, CacheEntry>) {
        let mut by_age: Vec<(Instant, u64, String)> = entries
            .iter()
            .map(|(key, entry)| (entry.stored_at, entry.seq, key.clone()))
            .collect();
        by_age.sort_unstable();

        let to_remove = entries.len() / 2;
        for (_, _, key) in by_age.into_iter().take(to_remove) {
            entries.remove(&key);
        }

        self.evictions.fetch_add(to_remove as u64, Ordering::Relaxed);
        debug!(evicted = to_remove, remaining = entries.len(), "[Local] Evicted oldest half");
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Entries currently held, including expired ones not yet looked up
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    #[must_use]
    pub fn generate_key(&self, args: &KeyArgs) -> String {
        generate_key(args)
    }
}

/// Local cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

#[async_trait]
impl Cache for LocalCache {
    async fn get(&self, key: &str) -> Option<Value> {
        LocalCache::get(self, key)
    }

    async fn set(&self, key: &str, value: CacheValue) -> bool {
        LocalCache::set(self, key, value)
    }

    fn name(&self) -> &'static str {
        "Local"
    }
}
