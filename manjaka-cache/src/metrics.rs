//! Response cache metrics.
//!
//! Enable the `metrics` feature to record these; otherwise every recorder is a
//! no-op the compiler removes.
//!
//! ## Metrics
//!
//! - `manjaka_cache_hit_total` - Reads served from the cache (counter)
//! - `manjaka_cache_miss_total` - Reads that found nothing fresh (counter)
//! - `manjaka_cache_invalidated_total` - Entries removed by invalidation (counter)
//! - `manjaka_cache_entries` - Entries currently stored (gauge)
//!
//! Every metric carries a `cache` label with the cache's label.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for cache hits.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "manjaka_cache_hit_total",
            "Total number of reads served from the response cache."
        );
        "manjaka_cache_hit_total"
    };
    /// Metric name for cache misses.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "manjaka_cache_miss_total",
            "Total number of reads that found no fresh entry."
        );
        "manjaka_cache_miss_total"
    };
    /// Metric name for invalidated entries.
    pub static ref CACHE_INVALIDATED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "manjaka_cache_invalidated_total",
            "Total number of entries removed by explicit or pattern invalidation."
        );
        "manjaka_cache_invalidated_total"
    };
    /// Metric name for the entry count gauge.
    pub static ref CACHE_ENTRIES: &'static str = {
        metrics::describe_gauge!(
            "manjaka_cache_entries",
            "Current number of entries in the response cache."
        );
        "manjaka_cache_entries"
    };
}

/// Record a cache hit.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_hit(cache: &str) {
    metrics::counter!(*CACHE_HIT_COUNTER, "cache" => cache.to_string()).increment(1);
}

/// Record a cache hit (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_hit(_cache: &str) {}

/// Record a cache miss.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_miss(cache: &str) {
    metrics::counter!(*CACHE_MISS_COUNTER, "cache" => cache.to_string()).increment(1);
}

/// Record a cache miss (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_miss(_cache: &str) {}

/// Record invalidated entries.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_invalidated(cache: &str, count: usize) {
    metrics::counter!(*CACHE_INVALIDATED_COUNTER, "cache" => cache.to_string())
        .increment(count as u64);
}

/// Record invalidated entries (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_invalidated(_cache: &str, _count: usize) {}

/// Record the current entry count.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_entries(cache: &str, entries: usize) {
    metrics::gauge!(*CACHE_ENTRIES, "cache" => cache.to_string()).set(entries as f64);
}

/// Record the current entry count (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_entries(_cache: &str, _entries: usize) {}
