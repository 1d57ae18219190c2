//! Remote Backend Implementations
//!
//! Implementations of the remote wire protocol ([`RemoteConnection`](crate::traits::RemoteConnection))
//! and the connectors that open them.
//!
//! # Available Backends
//!
//! - **Redis** - the production remote tier (feature: `redis`, on by default)
//! - **Memory** - `DashMap`-backed, in-process; for development and tests
//!
//! # Usage
//!
//! ```rust,no_run
//! use resilient_cache::backends::{MemoryConnector, RedisConnector};
//! use resilient_cache::CacheConfig;
//!
//! let redis = RedisConnector::from_config(&CacheConfig::default());
//! let memory = MemoryConnector::new();
//! ```

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use memory::{MemoryConnector, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_backend::{RedisConnection, RedisConnector};
