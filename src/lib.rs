//! Resilient Cache
//!
//! A two-tier caching library for Rust services that must never fail a
//! request because the cache is down:
//! - **Remote Tier**: Redis (or any [`Connector`]) with namespacing, retry
//!   with exponential backoff and jitter, and a circuit breaker
//! - **Local Tier**: bounded in-process TTL store with batch eviction
//! - **Hybrid Cache**: remote first, local fallback, automatic degradation
//!   to local-only on circuit-open or connection failures
//! - **Deterministic Keys**: order-independent key derivation from
//!   positional and named arguments
//! - **Extended Serialization**: timestamps, UUIDs, decimals and sets encode
//!   to canonical JSON
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resilient_cache::{CacheConfig, CacheFactory, KeyArgs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = CacheFactory::new(CacheConfig::from_env()?)?;
//!     factory.initialize().await;
//!
//!     let cache = factory.create_cache("job_matches").await?;
//!     let key = cache.generate_key(&KeyArgs::new().arg("job").arg(42));
//!
//!     cache.set(&key, serde_json::json!({"score": 0.91})).await;
//!     if let Some(cached) = cache.get(&key).await {
//!         tracing::info!("Cached data: {}", cached);
//!     }
//!
//!     factory.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! get → Remote (Redis) ──hit──→ return
//!         │ miss / error
//!         ↓
//!       Local ──hit──→ return
//!         │ miss
//!         ↓
//!       None
//!
//! set → Local (always) + Remote (best effort)
//! ```
//!
//! Every public cache operation is best-effort: failures surface as `None`
//! or `false` plus a log line, never as an error on the caller's path.

pub mod backends;
pub mod circuit_breaker;
pub mod codecs;
pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod hybrid_cache;
pub mod key;
pub mod local_cache;
pub mod metrics;
pub mod remote_cache;
pub mod traits;

pub use backends::{MemoryConnector, MemoryStore};
#[cfg(feature = "redis")]
pub use backends::{RedisConnection, RedisConnector};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use codecs::{CacheValue, JsonCodec};
pub use config::{CacheConfig, validate_namespace};
pub use connection::ConnectionManager;
pub use error::{CacheError, CacheResult};
pub use factory::CacheFactory;
pub use hybrid_cache::{HybridCache, HybridCacheStats, RemoteReenable};
pub use key::{KeyArgs, generate_key};
pub use local_cache::{LocalCache, LocalCacheStats};
pub use metrics::{CacheMetrics, Instrumented, MetricsSnapshot, timed, timed_sync};
pub use remote_cache::{RemoteCache, RetryPolicy};
pub use traits::{Cache, Connector, RemoteConnection, RemoteTier};

// Re-export async_trait for implementing the backend traits
pub use async_trait::async_trait;
