//! The response cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use manjaka_core::{Clock, RequestKey};
use regex::Regex;
use serde_json::Value;
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::builder::ResponseCacheBuilder;
use crate::cleanup::CleanupTask;
use crate::entry::CacheEntry;
use crate::metrics;

pub(crate) struct Inner<V> {
    pub(crate) entries: DashMap<RequestKey, CacheEntry<V>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) default_ttl: Duration,
    pub(crate) label: SmolStr,
}

/// In-memory TTL cache of unwrapped `GET` payloads.
///
/// Cloning is cheap and yields a handle to the same storage, so a single
/// cache is created at startup and shared by reference-counted handles.
///
/// # Guarantees
///
/// - An entry is never returned once `now - stored_at >= ttl`
/// - Writes are last-writer-wins
/// - Every operation is infallible and synchronous
///
/// # Type Parameters
///
/// * `V` - Cached payload. Defaults to [`serde_json::Value`].
pub struct ResponseCache<V = Value> {
    pub(crate) inner: Arc<Inner<V>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("label", &self.inner.label)
            .field("entries", &self.inner.entries.len())
            .field("default_ttl", &self.inner.default_ttl)
            .field("clock", &self.inner.clock)
            .finish()
    }
}

impl ResponseCache<Value> {
    /// Creates a builder for a cache of JSON payloads.
    pub fn builder() -> ResponseCacheBuilder<Value> {
        ResponseCacheBuilder::new()
    }
}

impl<V> ResponseCache<V>
where
    V: Clone,
{
    /// Returns the cached value unless it has expired.
    ///
    /// An expired entry is removed before returning `None`. A miss has no side
    /// effect.
    pub fn get(&self, key: &RequestKey) -> Option<V> {
        let now = self.inner.clock.now();

        // The read guard must be released before removing from the same shard.
        let expired = match self.inner.entries.get(key) {
            None => {
                trace!(%key, "cache miss");
                metrics::record_miss(&self.inner.label);
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                trace!(%key, "cache hit");
                metrics::record_hit(&self.inner.label);
                return Some(entry.value().value().clone());
            }
            Some(entry) => entry.expires_at(),
        };

        // Only remove if nobody wrote a fresh value in between.
        self.inner
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now));
        debug!(%key, %expired, "evicted expired cache entry on read");
        metrics::record_miss(&self.inner.label);
        None
    }
}

impl<V> ResponseCache<V> {
    pub(crate) fn from_parts(clock: Arc<dyn Clock>, default_ttl: Duration, label: SmolStr) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                clock,
                default_ttl,
                label,
            }),
        }
    }

    /// Stores `value` with the default TTL, replacing any previous entry.
    pub fn set(&self, key: RequestKey, value: V) {
        self.set_with_ttl(key, value, self.inner.default_ttl);
    }

    /// Stores `value` with an explicit TTL, replacing any previous entry.
    pub fn set_with_ttl(&self, key: RequestKey, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, self.inner.clock.now(), ttl);
        trace!(%key, ttl_ms = ttl.as_millis() as u64, "cache set");
        self.inner.entries.insert(key, entry);
        metrics::record_entries(&self.inner.label, self.inner.entries.len());
    }

    /// Removes a single entry. Returns `true` if one was present.
    pub fn invalidate(&self, key: &RequestKey) -> bool {
        let removed = self.inner.entries.remove(key).is_some();
        if removed {
            debug!(%key, "cache entry invalidated");
            metrics::record_invalidated(&self.inner.label, 1);
        }
        removed
    }

    /// Removes every entry whose key string matches `pattern`.
    ///
    /// Non-matching entries are left untouched. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut removed = 0usize;
        self.inner.entries.retain(|key, _| {
            if pattern.is_match(key.as_str()) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(pattern = %pattern, removed, "cache entries invalidated by pattern");
            metrics::record_invalidated(&self.inner.label, removed);
        }
        removed
    }

    /// Removes every expired entry. Returns the number removed.
    ///
    /// Correctness does not depend on this: [`get`](Self::get) never serves an
    /// expired entry. Sweeping only bounds memory held by keys that are no
    /// longer read.
    pub fn cleanup(&self) -> usize {
        let now = self.inner.clock.now();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.inner.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.inner.entries.len(), "cache cleanup sweep");
        }
        metrics::record_entries(&self.inner.label, self.inner.entries.len());
        removed
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let removed = self.inner.entries.len();
        self.inner.entries.clear();
        debug!(removed, "cache cleared");
        metrics::record_entries(&self.inner.label, 0);
    }

    /// Returns `true` when a live (unexpired) entry exists for `key`.
    pub fn contains(&self, key: &RequestKey) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// TTL used by [`set`](Self::set).
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Label identifying this cache in logs and metrics.
    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl<V> ResponseCache<V>
where
    V: Send + Sync + 'static,
{
    /// Starts a background task sweeping expired entries every `interval`.
    ///
    /// The task stops when the returned [`CleanupTask`] is stopped or dropped,
    /// or once every handle to this cache is gone. Must be called from within a
    /// tokio runtime.
    pub fn spawn_cleanup(&self, interval: Duration) -> CleanupTask {
        CleanupTask::spawn(Arc::downgrade(&self.inner), interval)
    }
}
