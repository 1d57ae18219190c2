//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A fault-injecting backend over the in-process memory store
//! - A scripted remote tier for hybrid cache tests
//! - Config and namespace helpers
//! - Tracing setup

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use resilient_cache::backends::MemoryStore;
use resilient_cache::{
    CacheConfig, CacheError, CacheResult, ConnectionManager, Connector, RemoteCache,
    RemoteConnection, RemoteTier, async_trait,
};
use serde_json::Value;

/// Install a test-friendly subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Unique namespace so tests never see each other's keys
pub fn unique_namespace(name: &str) -> String {
    format!("test_{name}_{}", uuid::Uuid::new_v4().simple())
}

/// Config used by the remote-path tests: 300 s TTL, 2 retries from 100 ms
///
/// The health-check interval is long enough that the loop stays out of the
/// way unless a test drives it explicitly.
pub fn test_config() -> CacheConfig {
    CacheConfig {
        ttl_s: 300,
        max_retries: 2,
        initial_backoff_ms: 100,
        max_backoff_ms: 2000,
        health_check_interval_s: 3600,
        ..CacheConfig::default()
    }
}

/// Failure to inject into every backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Connection,
    Operation,
}

/// Shared state behind [`FaultyConnector`] and its connections
pub struct FaultState {
    pub store: Arc<MemoryStore>,
    fault: Mutex<Fault>,
    refuse_connect: AtomicBool,
    connect_delay: Mutex<Duration>,
    scan_limit: Mutex<Option<usize>>,
    pub connects: AtomicUsize,
    pub pings: AtomicUsize,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub dels: AtomicUsize,
    pub scans: AtomicUsize,
}

impl FaultState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(MemoryStore::new()),
            fault: Mutex::new(Fault::None),
            refuse_connect: AtomicBool::new(false),
            connect_delay: Mutex::new(Duration::ZERO),
            scan_limit: Mutex::new(None),
            connects: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            dels: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
        })
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Make every later connect attempt hang for `delay` first
    pub fn delay_connections(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Let `limit` more SCAN calls through, then fail the rest
    pub fn fail_scans_after(&self, limit: usize) {
        *self.scan_limit.lock() = Some(Self::count(&self.scans) + limit);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check(&self) -> CacheResult<()> {
        match *self.fault.lock() {
            Fault::None => Ok(()),
            Fault::Connection => Err(CacheError::Connection("connection reset by peer".into())),
            Fault::Operation => Err(CacheError::Operation("LOADING dataset in memory".into())),
        }
    }
}

/// Connection that counts calls and fails on demand
pub struct FaultyConnection {
    state: Arc<FaultState>,
}

#[async_trait]
impl RemoteConnection for FaultyConnection {
    async fn ping(&self) -> CacheResult<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        self.state.check()?;
        self.state.store.ping().await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.state.gets.fetch_add(1, Ordering::SeqCst);
        self.state.check()?;
        self.state.store.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.state.sets.fetch_add(1, Ordering::SeqCst);
        self.state.check()?;
        self.state.store.set_ex(key, value, ttl).await
    }

    async fn del(&self, keys: &[String]) -> CacheResult<usize> {
        self.state.dels.fetch_add(1, Ordering::SeqCst);
        self.state.check()?;
        self.state.store.del(keys).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<(u64, Vec<String>)> {
        let issued = self.state.scans.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.check()?;
        let limit = *self.state.scan_limit.lock();
        if limit.is_some_and(|limit| issued > limit) {
            return Err(CacheError::Connection("connection reset during SCAN".into()));
        }
        self.state.store.scan(cursor, pattern, count).await
    }

    fn name(&self) -> &'static str {
        "Faulty"
    }
}

/// Connector over a [`FaultState`]
pub struct FaultyConnector {
    state: Arc<FaultState>,
}

impl FaultyConnector {
    pub fn new(state: &Arc<FaultState>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::clone(state),
        })
    }
}

#[async_trait]
impl Connector for FaultyConnector {
    async fn connect(&self) -> CacheResult<Arc<dyn RemoteConnection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("connection refused".into()));
        }
        Ok(Arc::new(FaultyConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn name(&self) -> &'static str {
        "Faulty"
    }
}

/// Initialized connection manager over a fresh faulty backend
pub async fn connected_manager(config: &CacheConfig) -> (Arc<FaultState>, Arc<ConnectionManager>) {
    let state = FaultState::new();
    let manager = Arc::new(ConnectionManager::from_config(FaultyConnector::new(&state), config));
    assert!(manager.initialize().await, "memory backend should always connect");
    (state, manager)
}

/// Remote cache scoped to `namespace` over a fresh faulty backend
pub async fn remote_cache(
    config: &CacheConfig,
    namespace: &str,
) -> (Arc<FaultState>, Arc<ConnectionManager>, RemoteCache) {
    let (state, manager) = connected_manager(config).await;
    let cache = RemoteCache::new(Arc::clone(&manager), &config.with_namespace(namespace))
        .expect("test namespaces are valid");
    (state, manager, cache)
}

/// Remote tier whose answers are scripted by the test
#[derive(Default)]
pub struct ScriptedTier {
    values: Mutex<HashMap<String, Value>>,
    error: Mutex<Option<CacheError>>,
    pub fetches: AtomicUsize,
    pub stores: AtomicUsize,
}

impl ScriptedTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: CacheError) -> Arc<Self> {
        let tier = Self::new();
        tier.fail_with(Some(error));
        tier
    }

    /// Every call returns `error` until cleared with `None`
    pub fn fail_with(&self, error: Option<CacheError>) {
        *self.error.lock() = error;
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTier for ScriptedTier {
    async fn fetch(&self, key: &str) -> CacheResult<Option<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.error.lock().clone() {
            return Err(e);
        }
        Ok(self.value(key))
    }

    async fn store(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.error.lock().clone() {
            return Err(e);
        }
        self.insert(key, value.clone());
        Ok(())
    }
}
