//! Hybrid Cache - Remote First, Local Fallback
//!
//! Reads go to the remote tier when it is enabled and fall back to the local
//! store on a miss or failure. Writes always land locally and are mirrored to
//! the remote on a best-effort basis. A circuit-open or connection-class
//! failure disables the remote tier for this instance.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codecs::{CacheValue, JsonCodec};
use crate::error::{CacheError, CacheResult};
use crate::key::KeyArgs;
use crate::local_cache::LocalCache;
use crate::traits::{Cache, RemoteTier};

/// What happens to a remote tier after it has been disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteReenable {
    /// Stay local-only for the rest of this instance's life
    #[default]
    Never,
    /// Route to the remote again once this long has passed since it was disabled
    After(Duration),
}

impl RemoteReenable {
    #[must_use]
    pub fn from_cooldown(cooldown: Option<Duration>) -> Self {
        cooldown.map_or(Self::Never, Self::After)
    }
}

/// Hybrid cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridCacheStats {
    pub remote_hits: u64,
    pub local_hits: u64,
    pub misses: u64,
    pub remote_errors: u64,
    /// Times the remote tier was switched off
    pub remote_disables: u64,
    pub remote_enabled: bool,
}

/// Two-tier cache with automatic degradation to the local tier
pub struct HybridCache {
    local: Arc<LocalCache>,
    remote: RwLock<Option<Arc<dyn RemoteTier>>>,
    /// Remote switched off by a failure, kept for a timed re-enable
    disabled: Mutex<Option<(Arc<dyn RemoteTier>, Instant)>>,
    reenable: RemoteReenable,
    initialized: AtomicBool,
    codec: JsonCodec,
    remote_hits: AtomicU64,
    local_hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
    remote_disables: AtomicU64,
}

impl HybridCache {
    /// Local-only cache until [`initialize`](Self::initialize) supplies a remote
    #[must_use]
    pub fn new(local: Arc<LocalCache>) -> Self {
        Self {
            local,
            remote: RwLock::new(None),
            disabled: Mutex::new(None),
            reenable: RemoteReenable::Never,
            initialized: AtomicBool::new(false),
            codec: JsonCodec,
            remote_hits: AtomicU64::new(0),
            local_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            remote_disables: AtomicU64::new(0),
        }
    }

    /// Cache with an already-built remote tier
    #[must_use]
    pub fn with_remote(local: Arc<LocalCache>, remote: Arc<dyn RemoteTier>) -> Self {
        let cache = Self::new(local);
        *cache.remote.write() = Some(remote);
        cache.initialized.store(true, Ordering::Release);
        cache
    }

    #[must_use]
    pub fn with_reenable_policy(mut self, policy: RemoteReenable) -> Self {
        self.reenable = policy;
        self
    }

    /// Try once to build the remote tier
    ///
    /// An error or `None` from `build` leaves this instance local-only; the
    /// attempt is not repeated. Calls after the first are no-ops.
    pub async fn initialize<F, Fut>(&self, build: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<Option<Arc<dyn RemoteTier>>>>,
    {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        match build().await {
            Ok(Some(remote)) => {
                *self.remote.write() = Some(remote);
                info!("Hybrid cache using remote tier with local fallback");
            }
            Ok(None) => {
                info!("Remote tier unavailable, hybrid cache running local-only");
            }
            Err(e) => {
                warn!(error = %e, "Remote tier failed to initialize, hybrid cache running local-only");
            }
        }
    }

    /// Current remote tier, restoring a disabled one whose cooldown has passed
    fn active_remote(&self) -> Option<Arc<dyn RemoteTier>> {
        if let Some(remote) = self.remote.read().clone() {
            return Some(remote);
        }

        let RemoteReenable::After(cooldown) = self.reenable else {
            return None;
        };

        let mut disabled = self.disabled.lock();
        let ready = disabled
            .as_ref()
            .is_some_and(|(_, since)| since.elapsed() >= cooldown);
        if !ready {
            return None;
        }

        let (remote, _) = disabled.take()?;
        *self.remote.write() = Some(Arc::clone(&remote));
        info!(cooldown_secs = cooldown.as_secs_f64(), "Re-enabling remote tier after cooldown");
        Some(remote)
    }

    fn disable_remote(&self, remote: Arc<dyn RemoteTier>, cause: &CacheError) {
        let mut slot = self.remote.write();
        let still_current = slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &remote));
        if !still_current {
            return;
        }
        *slot = None;
        drop(slot);

        *self.disabled.lock() = Some((remote, Instant::now()));
        self.remote_disables.fetch_add(1, Ordering::Relaxed);
        warn!(error = %cause, policy = ?self.reenable, "Remote tier disabled, falling back to local cache");
    }

    fn handle_remote_error(&self, remote: Arc<dyn RemoteTier>, op: &'static str, key: &str, e: &CacheError) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
        if e.disables_remote() {
            self.disable_remote(remote, e);
        } else {
            error!(op, key = %key, error = %e, "Unexpected remote cache error, using local tier");
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(remote) = self.active_remote() {
            match remote.fetch(key).await {
                Ok(Some(value)) => {
                    self.remote_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(None) => debug!(key = %key, "Remote miss, checking local tier"),
                Err(e) => self.handle_remote_error(remote, "get", key, &e),
            }
        }

        if let Some(value) = self.local.get(key) {
            self.local_hits.fetch_add(1, Ordering::Relaxed);
            Some(value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Write locally and mirror to the remote tier
    ///
    /// Returns whether the local write succeeded; the remote outcome does
    /// not affect the result.
    pub async fn set(&self, key: &str, value: impl Into<CacheValue>) -> bool {
        let json = match self.codec.to_value(&value.into()) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Value cannot be encoded, not caching");
                return false;
            }
        };

        self.local.insert(key, json.clone());

        if let Some(remote) = self.active_remote() {
            if let Err(e) = remote.store(key, &json).await {
                self.handle_remote_error(remote, "set", key, &e);
            }
        }

        true
    }

    /// Key derivation, identical whether or not the remote is enabled
    #[must_use]
    pub fn generate_key(&self, args: &KeyArgs) -> String {
        self.local.generate_key(args)
    }

    #[must_use]
    pub fn is_remote_enabled(&self) -> bool {
        self.remote.read().is_some()
    }

    #[must_use]
    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    #[must_use]
    pub fn stats(&self) -> HybridCacheStats {
        HybridCacheStats {
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            remote_disables: self.remote_disables.load(Ordering::Relaxed),
            remote_enabled: self.is_remote_enabled(),
        }
    }
}

#[async_trait]
impl Cache for HybridCache {
    async fn get(&self, key: &str) -> Option<Value> {
        HybridCache::get(self, key).await
    }

    async fn set(&self, key: &str, value: CacheValue) -> bool {
        HybridCache::set(self, key, value).await
    }

    fn generate_key(&self, args: &KeyArgs) -> String {
        HybridCache::generate_key(self, args)
    }

    fn error_count(&self) -> u64 {
        self.remote_errors.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "Hybrid"
    }
}
