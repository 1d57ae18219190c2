//! Benchmarks for basic cache operations
//!
//! This benchmark suite measures the performance of:
//! - Local cache read/write operations
//! - Hybrid cache read/write over the in-process remote backend
//! - Local hit vs remote hit vs miss latency
//! - Key derivation
//! - Different data sizes

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use resilient_cache::{
    CacheConfig, CacheFactory, HybridCache, KeyArgs, LocalCache, MemoryConnector,
};
use serde_json::json;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"))
}

/// Hybrid cache over the memory backend, plus the factory that owns its connection
fn setup_hybrid(rt: &Runtime) -> (CacheFactory, Arc<HybridCache>) {
    rt.block_on(async {
        let factory =
            CacheFactory::with_connector(CacheConfig::default(), Arc::new(MemoryConnector::new()))
                .unwrap_or_else(|_| panic!("Invalid benchmark config"));
        factory.initialize().await;
        let cache = factory
            .create_cache("bench")
            .await
            .unwrap_or_else(|_| panic!("Failed to create cache"));
        (factory, cache)
    })
}

/// Generate test data of specified size
fn test_data(size_bytes: usize) -> serde_json::Value {
    let data_string = "x".repeat(size_bytes);
    json!({
        "data": data_string,
        "size": size_bytes,
        "timestamp": "2025-01-01T00:00:00Z"
    })
}

fn bench_local(c: &mut Criterion) {
    let cache = LocalCache::new(100_000, Duration::from_secs(3600))
        .unwrap_or_else(|_| panic!("Failed to create local cache"));
    cache.set("hit", test_data(1024));

    let mut group = c.benchmark_group("local_cache");
    for size in &[100, 1024, 10240] {
        let data = test_data(*size);
        group.bench_with_input(BenchmarkId::new("set", size), size, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                cache.set(&format!("bench:set:{}", i % 10_000), black_box(data.clone()))
            });
        });
    }
    group.bench_function("get_hit", |b| b.iter(|| cache.get(black_box("hit"))));
    group.bench_function("get_miss", |b| b.iter(|| cache.get(black_box("miss"))));
    group.finish();
}

fn bench_hybrid(c: &mut Criterion) {
    let rt = runtime();
    let (factory, cache) = setup_hybrid(&rt);
    rt.block_on(cache.set("hit", test_data(1024)));

    let mut group = c.benchmark_group("hybrid_cache");
    group.measurement_time(Duration::from_secs(5));

    for size in &[100, 1024, 10240] {
        let data = test_data(*size);
        group.bench_with_input(BenchmarkId::new("set", size), size, |b, _| {
            b.to_async(&rt).iter(|| {
                let key = format!("bench:set:{}", rand::random::<u16>());
                let value = data.clone();
                let cache = Arc::clone(&cache);
                async move { cache.set(&key, black_box(value)).await }
            });
        });
    }

    group.bench_function("get_remote_hit", |b| {
        b.to_async(&rt).iter(|| {
            let cache = Arc::clone(&cache);
            async move { cache.get(black_box("hit")).await }
        });
    });
    group.bench_function("get_miss", |b| {
        b.to_async(&rt).iter(|| {
            let cache = Arc::clone(&cache);
            async move { cache.get(black_box("miss")).await }
        });
    });
    group.finish();

    rt.block_on(factory.close());
}

fn bench_key_generation(c: &mut Criterion) {
    let args = KeyArgs::new()
        .arg("user")
        .arg(123)
        .arg(json!(["rust", "go", "python"]))
        .kwarg("location", "Boston")
        .kwarg("radius", 25);

    c.bench_function("generate_key", |b| {
        b.iter(|| resilient_cache::generate_key(black_box(&args)));
    });
}

criterion_group!(benches, bench_local, bench_hybrid, bench_key_generation);
criterion_main!(benches);
