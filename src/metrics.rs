//! Cache Metrics
//!
//! Hit/miss/write/error counters and latency totals for any [`Cache`],
//! collected by wrapping it in [`Instrumented`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::codecs::CacheValue;
use crate::key::KeyArgs;
use crate::traits::Cache;

/// Await `fut` and report how long it took
pub async fn timed<F: Future>(fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let output = fut.await;
    (output, start.elapsed())
}

/// Run `f` and report how long it took
pub fn timed_sync<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let output = f();
    (output, start.elapsed())
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// Atomic counters shared between an [`Instrumented`] cache and its readers
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    set_failures: AtomicU64,
    /// Backend failures reported by the wrapped cache's `error_count`
    errors: AtomicU64,
    key_generations: AtomicU64,
    get_latency_us: AtomicU64,
    set_latency_us: AtomicU64,
}

impl CacheMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_get(&self, hit: bool, elapsed: Duration) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.get_latency_us.fetch_add(micros(elapsed), Ordering::Relaxed);
    }

    fn record_set(&self, ok: bool, elapsed: Duration) {
        if ok {
            self.sets.fetch_add(1, Ordering::Relaxed);
        } else {
            self.set_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.set_latency_us.fetch_add(micros(elapsed), Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            set_failures: self.set_failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            key_generations: self.key_generations.load(Ordering::Relaxed),
            get_latency_us: self.get_latency_us.load(Ordering::Relaxed),
            set_latency_us: self.set_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub set_failures: u64,
    /// Backend failures, including reads that degraded to a miss
    pub errors: u64,
    pub key_generations: u64,
    /// Cumulative microseconds spent in `get`
    pub get_latency_us: u64,
    /// Cumulative microseconds spent in `set`
    pub set_latency_us: u64,
}

impl MetricsSnapshot {
    /// Hit percentage over all reads, 0.0 when nothing was read
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64 * 100.0
        }
    }

    /// Mean `get` latency in microseconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_get_latency_us(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.get_latency_us as f64 / reads as f64
        }
    }
}

/// A cache wrapped with metrics collection
///
/// ```rust
/// use resilient_cache::{Cache, Instrumented, LocalCache};
/// use std::time::Duration;
///
/// # async fn example() -> resilient_cache::CacheResult<()> {
/// let cache = Instrumented::new(LocalCache::new(100, Duration::from_secs(60))?);
/// cache.set("k", serde_json::json!(1).into()).await;
/// cache.get("k").await;
/// assert_eq!(cache.metrics().snapshot().hits, 1);
/// # Ok(())
/// # }
/// ```
pub struct Instrumented<C> {
    inner: C,
    metrics: Arc<CacheMetrics>,
    /// Last `inner.error_count()` already added to `metrics`
    seen_errors: AtomicU64,
}

impl<C: Cache> Instrumented<C> {
    pub fn new(inner: C) -> Self {
        Self::with_metrics(inner, Arc::new(CacheMetrics::new()))
    }

    /// Wrap `inner`, recording into an existing metrics sink
    pub fn with_metrics(inner: C, metrics: Arc<CacheMetrics>) -> Self {
        let seen_errors = AtomicU64::new(inner.error_count());
        Self {
            inner,
            metrics,
            seen_errors,
        }
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Move newly reported inner errors into the sink, each exactly once
    fn record_errors(&self) -> u64 {
        let total = self.inner.error_count();
        let seen = self.seen_errors.fetch_max(total, Ordering::Relaxed);
        let fresh = total.saturating_sub(seen);
        if fresh > 0 {
            self.metrics.errors.fetch_add(fresh, Ordering::Relaxed);
        }
        fresh
    }
}

#[async_trait]
impl<C: Cache> Cache for Instrumented<C> {
    async fn get(&self, key: &str) -> Option<Value> {
        let (value, elapsed) = timed(self.inner.get(key)).await;
        self.metrics.record_get(value.is_some(), elapsed);
        let errors = self.record_errors();
        debug!(
            cache = self.inner.name(),
            key = %key,
            hit = value.is_some(),
            errors,
            latency_us = micros(elapsed),
            "cache get"
        );
        value
    }

    async fn set(&self, key: &str, value: CacheValue) -> bool {
        let (ok, elapsed) = timed(self.inner.set(key, value)).await;
        self.metrics.record_set(ok, elapsed);
        let errors = self.record_errors();
        debug!(
            cache = self.inner.name(),
            key = %key,
            ok,
            errors,
            latency_us = micros(elapsed),
            "cache set"
        );
        ok
    }

    fn generate_key(&self, args: &KeyArgs) -> String {
        let (key, elapsed) = timed_sync(|| self.inner.generate_key(args));
        self.metrics.key_generations.fetch_add(1, Ordering::Relaxed);
        debug!(cache = self.inner.name(), latency_us = micros(elapsed), "cache key generated");
        key
    }

    fn error_count(&self) -> u64 {
        self.inner.error_count()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
