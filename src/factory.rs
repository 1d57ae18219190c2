//! Cache Factory
//!
//! Process-level context that owns the shared remote connection and hands
//! out one [`HybridCache`] per namespace. Construct it once at startup, call
//! [`initialize`](CacheFactory::initialize), pass it by reference to the
//! components that need caches, and [`close`](CacheFactory::close) it at
//! shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use resilient_cache::{CacheConfig, CacheFactory};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = CacheFactory::new(CacheConfig::from_env()?)?;
//!     factory.initialize().await;
//!
//!     let matches = factory.create_cache("job_matches").await?;
//!     matches.set("job:42", serde_json::json!({"score": 0.91})).await;
//!
//!     factory.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, validate_namespace};
use crate::connection::ConnectionManager;
use crate::error::{CacheError, CacheResult};
use crate::hybrid_cache::{HybridCache, RemoteReenable};
use crate::local_cache::LocalCache;
use crate::remote_cache::RemoteCache;
use crate::traits::{Connector, RemoteTier};

/// Builds and memoizes namespaced caches over one shared connection
pub struct CacheFactory {
    config: CacheConfig,
    connector: Option<Arc<dyn Connector>>,
    connections: RwLock<Option<Arc<ConnectionManager>>>,
    caches: DashMap<String, Arc<HybridCache>>,
    initialized: AtomicBool,
}

impl CacheFactory {
    /// Factory over the default remote backend
    ///
    /// Without the `redis` feature this is the same as [`local_only`](Self::local_only).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `config` fails validation.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        #[cfg(feature = "redis")]
        {
            let connector = Arc::new(crate::backends::RedisConnector::from_config(&config));
            Self::with_connector(config, connector)
        }
        #[cfg(not(feature = "redis"))]
        {
            Self::local_only(config)
        }
    }

    /// Factory over a caller-supplied remote backend
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `config` fails validation.
    pub fn with_connector(config: CacheConfig, connector: Arc<dyn Connector>) -> CacheResult<Self> {
        Self::build(config, Some(connector))
    }

    /// Factory whose caches never use a remote tier
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `config` fails validation.
    pub fn local_only(config: CacheConfig) -> CacheResult<Self> {
        Self::build(config, None)
    }

    fn build(config: CacheConfig, connector: Option<Arc<dyn Connector>>) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            connections: RwLock::new(None),
            caches: DashMap::new(),
            initialized: AtomicBool::new(false),
        })
    }

    /// Open the shared remote connection
    ///
    /// Must be called before [`create_cache`](Self::create_cache). Returns
    /// whether a remote tier is available; `false` still leaves the factory
    /// usable in local-only mode. Calling again after success is a no-op.
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return self.is_remote_available();
        }

        let Some(connector) = self.connector.clone() else {
            info!("Cache factory initialized in local-only mode");
            return false;
        };

        let manager = Arc::new(ConnectionManager::from_config(connector, &self.config));
        if manager.initialize().await {
            *self.connections.write() = Some(manager);
            info!("Cache factory initialized with remote tier");
            true
        } else {
            warn!("Remote backend unavailable, caches will run local-only");
            false
        }
    }

    /// Cache scoped to `namespace`, built on first request
    ///
    /// Repeated calls with the same namespace return the same instance.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotInitialized`] before [`initialize`](Self::initialize)
    /// or after [`close`](Self::close); [`CacheError::Config`] if the
    /// namespace contains `:` or a glob metacharacter, or the local tier
    /// cannot be built.
    pub async fn create_cache(&self, namespace: &str) -> CacheResult<Arc<HybridCache>> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(CacheError::NotInitialized);
        }
        if let Some(cache) = self.caches.get(namespace) {
            return Ok(Arc::clone(cache.value()));
        }
        validate_namespace(namespace)?;

        let scoped = self.config.with_namespace(namespace);
        let local = Arc::new(LocalCache::from_config(&scoped)?);
        let cache = HybridCache::new(local).with_reenable_policy(RemoteReenable::from_cooldown(
            scoped.remote_reenable_after(),
        ));

        let manager = self.connections.read().clone();
        cache
            .initialize(|| async move {
                manager
                    .filter(|m| m.is_connected())
                    .map(|m| {
                        RemoteCache::new(m, &scoped).map(|r| Arc::new(r) as Arc<dyn RemoteTier>)
                    })
                    .transpose()
            })
            .await;

        debug!(namespace = %namespace, remote = cache.is_remote_enabled(), "Created cache");
        let cache = self
            .caches
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(cache))
            .clone();
        Ok(cache)
    }

    /// Shared connection manager, if a remote backend is connected
    #[must_use]
    pub fn connections(&self) -> Option<Arc<ConnectionManager>> {
        self.connections.read().clone()
    }

    #[must_use]
    pub fn is_remote_available(&self) -> bool {
        self.connections
            .read()
            .as_ref()
            .is_some_and(|m| m.is_connected())
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Namespaces with a live cache instance
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stop health checks, release the connection and forget every cache
    ///
    /// Idempotent. The factory may be initialized again afterwards.
    pub async fn close(&self) {
        self.initialized.store(false, Ordering::Release);
        self.caches.clear();

        let manager = self.connections.write().take();
        if let Some(manager) = manager {
            manager.close().await;
        }
        info!("Cache factory closed");
    }
}
