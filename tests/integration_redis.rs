//! Live Redis integration tests
//!
//! Require a running Redis server at `REDIS_URL` (default
//! `redis://127.0.0.1:6379`). Run with `cargo test -- --ignored`.

#![cfg(feature = "redis")]

mod common;

use std::sync::Arc;

use common::*;
use resilient_cache::{
    CacheConfig, CacheFactory, ConnectionManager, RedisConnector, RemoteCache,
};
use serde_json::json;

fn live_config() -> CacheConfig {
    CacheConfig {
        url: Some(redis_url()),
        ttl_s: 60,
        ..CacheConfig::default()
    }
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_round_trip_and_clear() {
    init_tracing();
    let config = live_config();
    let manager = Arc::new(ConnectionManager::from_config(
        Arc::new(RedisConnector::from_config(&config)),
        &config,
    ));
    assert!(manager.initialize().await, "Redis not reachable at {}", redis_url());

    let namespace = unique_namespace("redis");
    let cache = RemoteCache::new(Arc::clone(&manager), &config.with_namespace(&namespace)).unwrap();

    assert!(cache.set("job:42", json!({"score": 0.91})).await);
    assert_eq!(cache.get("job:42").await, Some(json!({"score": 0.91})));

    for i in 0..250 {
        assert!(cache.set(&format!("bulk:{i}"), i).await);
    }
    assert!(cache.clear_namespace().await);
    assert_eq!(cache.get("job:42").await, None);
    assert_eq!(cache.get("bulk:7").await, None);

    manager.close().await;
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_factory_hybrid_cache() {
    let factory = CacheFactory::new(live_config()).unwrap();
    assert!(factory.initialize().await);

    let cache = factory.create_cache(&unique_namespace("factory")).await.unwrap();
    assert!(cache.is_remote_enabled());
    assert!(cache.set("k", json!([1, 2, 3])).await);
    assert_eq!(cache.get("k").await, Some(json!([1, 2, 3])));

    factory.close().await;
}

#[tokio::test]
async fn test_unreachable_redis_fails_initialize() {
    let config = CacheConfig {
        url: Some("redis://127.0.0.1:1/0".to_string()),
        connection_timeout_s: 1,
        ..CacheConfig::default()
    };
    let factory = CacheFactory::new(config).unwrap();

    assert!(!factory.initialize().await);
    let cache = factory.create_cache("jobs").await.unwrap();
    assert!(!cache.is_remote_enabled());
    assert!(cache.set("k", 1).await);
    assert_eq!(cache.get("k").await, Some(json!(1)));
}
