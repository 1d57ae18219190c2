//! Memory Backend - In-Process Remote Protocol
//!
//! A `DashMap`-backed implementation of the remote wire protocol (PING, GET,
//! SETEX, DEL, SCAN). It lets the full remote path, including retries,
//! namespacing and namespace clearing, run without a Redis server: in local
//! development and in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};
use crate::traits::{Connector, RemoteConnection};

/// Stored entry with expiration tracking
#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
    /// Insertion order; SCAN cursors are positions in this sequence
    seq: u64,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// In-process keyed store speaking the remote protocol
///
/// **Features**:
/// - Per-key TTL with lazy expiry on read
/// - Glob `MATCH` patterns (`*`, `?`)
/// - Cursor-based `SCAN` that stays consistent while keys are deleted
///
/// **Example**:
/// ```rust
/// use resilient_cache::backends::MemoryStore;
/// use resilient_cache::RemoteConnection;
/// use std::time::Duration;
///
/// # async fn example() -> resilient_cache::CacheResult<()> {
/// let store = MemoryStore::new();
/// store.set_ex("jobs:42", br#"{"score":0.91}"#, Duration::from_secs(60)).await?;
/// assert!(store.get("jobs:42").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<String, StoredEntry>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[Memory] Purged expired entries");
        }
        removed
    }

    /// Number of stored entries, including not-yet-purged expired ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether `key` holds a live value
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.get(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Live keys in insertion order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut live: Vec<(u64, String)> = self
            .map
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| (entry.seq, entry.key().clone()))
            .collect();
        live.sort_unstable();
        live.into_iter().map(|(_, key)| key).collect()
    }
}

#[async_trait]
impl RemoteConnection for MemoryStore {
    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let Some(entry) = self.map.get(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.map.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::Operation(
                "invalid expire time in 'setex' command".to_string(),
            ));
        }
        let expires_at = Instant::now().checked_add(ttl).ok_or_else(|| {
            CacheError::Operation("invalid expire time in 'setex' command".to_string())
        })?;
        self.map
            .entry(key.to_string())
            .and_modify(|entry| {
                entry.value = value.to_vec();
                entry.expires_at = expires_at;
            })
            .or_insert_with(|| StoredEntry {
                value: value.to_vec(),
                expires_at,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed) + 1,
            });
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[Memory] Stored key with TTL");
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<usize> {
        Ok(keys
            .iter()
            .filter(|key| self.map.remove(key.as_str()).is_some())
            .count())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        let mut remaining: Vec<(u64, String, bool)> = self
            .map
            .iter()
            .filter(|entry| entry.seq > cursor)
            .map(|entry| (entry.seq, entry.key().clone(), entry.is_expired()))
            .collect();
        remaining.sort_unstable_by_key(|(seq, _, _)| *seq);

        let examined = count.max(1).min(remaining.len());
        let next_cursor = if examined < remaining.len() {
            remaining.get(examined - 1).map_or(0, |(seq, _, _)| *seq)
        } else {
            0
        };

        let keys = remaining
            .into_iter()
            .take(examined)
            .filter(|(_, key, expired)| !expired && glob_match(pattern, key))
            .map(|(_, key, _)| key)
            .collect();

        Ok((next_cursor, keys))
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// Glob matching with `*` (any run) and `?` (any single character)
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi).copied() {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(c) if c == '?' || Some(c) == text.get(ti).copied() => {
                pi += 1;
                ti += 1;
            }
            _ => match backtrack {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    backtrack = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    pattern
        .get(pi..)
        .is_none_or(|rest| rest.iter().all(|&c| c == '*'))
}

/// Connector handing out a shared [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing in-process memory backend");
        Self::default()
    }

    /// Connector over an existing store, so several managers can share it
    #[must_use]
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> CacheResult<Arc<dyn RemoteConnection>> {
        Ok(Arc::clone(&self.store) as Arc<dyn RemoteConnection>)
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("jobs:*", "jobs:42"));
        assert!(glob_match("jobs:*", "jobs:"));
        assert!(!glob_match("jobs:*", "jobsx:42"));
        assert!(!glob_match("jobs:*", "companies:jobs:1"));
        assert!(glob_match("user:?:profile", "user:7:profile"));
        assert!(!glob_match("user:?:profile", "user:77:profile"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }

    #[tokio::test]
    async fn test_get_set_del() {
        let store = MemoryStore::new();
        store
            .set_ex("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(
            store.del(&["k".to_string(), "missing".to_string()]).await.unwrap(),
            1
        );
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let store = MemoryStore::new();
        let result = store.set_ex("k", b"v", Duration::ZERO).await;
        assert!(matches!(result, Err(CacheError::Operation(_))));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let store = MemoryStore::new();
        let result = store.set_ex("k", b"v", Duration::from_secs(u64::MAX)).await;
        assert!(matches!(result, Err(CacheError::Operation(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store
            .set_ex("short", b"v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(!store.contains("short"));
    }

    #[tokio::test]
    async fn test_scan_visits_every_match_while_deleting() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store
                .set_ex(&format!("a:{i}"), b"1", Duration::from_secs(60))
                .await
                .unwrap();
            store
                .set_ex(&format!("b:{i}"), b"1", Duration::from_secs(60))
                .await
                .unwrap();
        }

        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let (next, keys) = store.scan(cursor, "a:*", 7).await.unwrap();
            assert!(keys.iter().all(|k| k.starts_with("a:")));
            seen += keys.len();
            store.del(&keys).await.unwrap();
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        assert_eq!(seen, 25);
        assert_eq!(store.len(), 25);
        assert!(store.keys().iter().all(|k| k.starts_with("b:")));
    }
}
