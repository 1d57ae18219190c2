//! Cache Traits
//!
//! This module defines the seams between the cache layers.
//!
//! # Architecture
//!
//! - `RemoteConnection`: the keyed wire protocol (PING, GET, SETEX, DEL, SCAN)
//! - `Connector`: builds a fresh `RemoteConnection`; used for initial connect and reconnects
//! - `RemoteTier`: error-returning remote cache operations consumed by `HybridCache`
//! - `Cache`: the consumer contract (`get`, `set`, `generate_key`)
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use resilient_cache::{Connector, RemoteConnection, CacheResult, async_trait};
//! use std::sync::Arc;
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> CacheResult<Arc<dyn RemoteConnection>> {
//!         // Open your transport here
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::codecs::CacheValue;
use crate::error::CacheResult;
use crate::key::{KeyArgs, generate_key};

/// A live connection to a keyed remote store
///
/// Implementations must bound every call by their own timeout so that no
/// operation can hang a caller indefinitely.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Liveness check
    async fn ping(&self) -> CacheResult<()>;

    /// Read a raw payload; `Ok(None)` on a miss
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write a raw payload with a time-to-live
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> CacheResult<usize>;

    /// One `SCAN cursor MATCH pattern COUNT count` step
    ///
    /// Returns `(next_cursor, keys)`; iteration is complete when `next_cursor == 0`.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
    -> CacheResult<(u64, Vec<String>)>;

    /// Release the connection; further calls may fail
    async fn close(&self) {}

    /// Backend name for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Factory for remote connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection, bounded by the connector's connect timeout
    async fn connect(&self) -> CacheResult<Arc<dyn RemoteConnection>>;

    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Remote cache operations that report why they failed
///
/// `HybridCache` uses the error class to decide whether to stop routing to
/// the remote tier.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    /// Read and decode a value; corrupted payloads count as a miss
    async fn fetch(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Encode and write a value with the configured TTL
    async fn store(&self, key: &str, value: &Value) -> CacheResult<()>;
}

/// The consumer-facing cache contract
///
/// Operations are best-effort: a failure is a miss (`None`) or an
/// unsuccessful write (`false`), never an error on the caller's path.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: CacheValue) -> bool;

    fn generate_key(&self, args: &KeyArgs) -> String {
        generate_key(args)
    }

    /// Backend failures absorbed so far, including those reported as misses
    fn error_count(&self) -> u64 {
        0
    }

    fn name(&self) -> &'static str {
        "unknown"
    }
}
