//! Single-flight request locking.
//!
//! [`RequestLockManager::with_lock`] guarantees that, for a given
//! [`RequestKey`], at most one producer runs at a time. Callers arriving while
//! it runs (or within a short grace period after it settled) receive clones of
//! the same outcome, success or failure.
//!
//! The producer runs on its own task, so it completes even if every caller
//! that was waiting on it goes away. A lock is released once its producer has
//! settled, no caller is waiting on it, and the grace period has passed. A
//! lock older than the lock timeout is treated as stuck: the next caller
//! replaces it and starts a fresh producer.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use manjaka_core::{ApiError, RequestKey};
use regex::Regex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, warn};

use crate::config::LockConfig;
use crate::metrics;

type SharedOutcome<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

struct LockEntry<V> {
    outcome: SharedOutcome<V>,
    created_at: Instant,
    generation: u64,
    waiters: usize,
    settled: bool,
}

impl<V> LockEntry<V> {
    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= timeout
    }

    fn is_releasable(&self, generation: u64) -> bool {
        self.generation == generation && self.settled && self.waiters == 0
    }
}

struct LockInner<V> {
    entries: DashMap<RequestKey, LockEntry<V>>,
    generation: AtomicU64,
    grace_period: Duration,
    lock_timeout: Duration,
}

impl<V> LockInner<V>
where
    V: Send + Sync + 'static,
{
    fn mark_settled(self: &Arc<Self>, key: &RequestKey, generation: u64) {
        let release = match self.entries.get_mut(key) {
            Some(mut entry) if entry.generation == generation => {
                entry.settled = true;
                entry.waiters == 0
            }
            _ => false,
        };
        if release {
            self.schedule_release(key.clone(), generation);
        }
    }

    fn leave(self: &Arc<Self>, key: &RequestKey, generation: u64) {
        let release = match self.entries.get_mut(key) {
            Some(mut entry) if entry.generation == generation => {
                entry.waiters = entry.waiters.saturating_sub(1);
                entry.is_releasable(generation)
            }
            _ => false,
        };
        if release {
            self.schedule_release(key.clone(), generation);
        }
    }

    fn schedule_release(self: &Arc<Self>, key: RequestKey, generation: u64) {
        if self.grace_period.is_zero() {
            self.release(&key, generation);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::downgrade(self);
                let grace = self.grace_period;
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(inner) = inner.upgrade() {
                        inner.release(&key, generation);
                    }
                });
            }
            Err(_) => self.release(&key, generation),
        }
    }

    fn release(&self, key: &RequestKey, generation: u64) {
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_releasable(generation))
            .is_some()
        {
            debug!(%key, "request lock released");
        }
    }
}

/// Holds a caller's place on a lock; leaving happens on drop so that
/// cancelled callers are accounted for too.
struct Waiter<V>
where
    V: Send + Sync + 'static,
{
    inner: Arc<LockInner<V>>,
    key: RequestKey,
    generation: u64,
}

impl<V> Drop for Waiter<V>
where
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.leave(&self.key, self.generation);
    }
}

/// Per-key single-flight coordinator.
///
/// # Examples
///
/// ```
/// use manjaka::RequestLockManager;
/// use manjaka_core::{Method, Params, RequestKey};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let locks = RequestLockManager::default();
/// let key = RequestKey::new(Method::GET, "/comptes", &Params::new());
///
/// let accounts = locks
///     .with_lock(key, || async { Ok(json!(["Caisse", "Banque"])) })
///     .await
///     .unwrap();
/// assert_eq!(accounts, json!(["Caisse", "Banque"]));
/// # }
/// ```
pub struct RequestLockManager<V = Value> {
    inner: Arc<LockInner<V>>,
}

impl<V> Clone for RequestLockManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for RequestLockManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLockManager")
            .field("locks", &self.inner.entries.len())
            .field("grace_period", &self.inner.grace_period)
            .field("lock_timeout", &self.inner.lock_timeout)
            .finish()
    }
}

impl<V> Default for RequestLockManager<V> {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}

impl<V> RequestLockManager<V> {
    /// Creates a manager with the given grace period and lock timeout.
    pub fn new(config: &LockConfig) -> Self {
        Self {
            inner: Arc::new(LockInner {
                entries: DashMap::new(),
                generation: AtomicU64::new(0),
                grace_period: config.grace_period,
                lock_timeout: config.lock_timeout,
            }),
        }
    }

    /// Returns `true` if a lock is held for `key`.
    pub fn is_locked(&self, key: &RequestKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Number of locks whose producer has not settled yet.
    pub fn in_flight(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| !entry.settled)
            .count()
    }

    /// Number of locks held, settled or not.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if no lock is held.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drops the lock for `key` so that the next caller starts a fresh
    /// producer instead of joining the current outcome.
    pub fn forget(&self, key: &RequestKey) -> bool {
        self.inner.entries.remove(key).is_some()
    }

    /// Drops every lock whose key matches `pattern`.
    pub fn forget_matching(&self, pattern: &Regex) -> usize {
        let mut forgotten = 0;
        self.inner.entries.retain(|key, _| {
            let matched = pattern.is_match(key.as_str());
            forgotten += usize::from(matched);
            !matched
        });
        forgotten
    }

    /// Drops every lock. Producers already running still complete and their
    /// current waiters still receive the outcome.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }
}

impl<V> RequestLockManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Runs `produce` under the lock for `key`, or joins the producer already
    /// running for it.
    ///
    /// `produce` is only called when this caller starts a new producer.
    pub async fn with_lock<F, Fut>(&self, key: RequestKey, produce: F) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let now = Instant::now();
        let (outcome, generation) = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied)
                if !occupied.get().is_stale(now, self.inner.lock_timeout) =>
            {
                let entry = occupied.get_mut();
                entry.waiters += 1;
                debug!(%key, waiters = entry.waiters, "joining in-flight request");
                metrics::record_coalesced();
                (entry.outcome.clone(), entry.generation)
            }
            Entry::Occupied(mut occupied) => {
                warn!(
                    %key,
                    age_ms = now.saturating_duration_since(occupied.get().created_at).as_millis() as u64,
                    "replacing stale request lock"
                );
                metrics::record_stale_lock();
                let entry = self.start(&key, now, produce);
                let started = (entry.outcome.clone(), entry.generation);
                occupied.insert(entry);
                started
            }
            Entry::Vacant(vacant) => {
                let entry = self.start(&key, now, produce);
                let started = (entry.outcome.clone(), entry.generation);
                vacant.insert(entry);
                started
            }
        };

        let _waiter = Waiter {
            inner: self.inner.clone(),
            key,
            generation,
        };
        outcome.await
    }

    fn start<F, Fut>(&self, key: &RequestKey, now: Instant, produce: F) -> LockEntry<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let settle_key = key.clone();
        let producer = produce();
        let span = debug_span!("request_lock", %key, generation);

        let handle = tokio::spawn(
            async move {
                let outcome = producer.await;
                inner.mark_settled(&settle_key, generation);
                outcome
            }
            .instrument(span),
        );

        let outcome = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(%error, "request producer did not complete");
                    Err(ApiError::Aborted)
                }
            }
        }
        .boxed()
        .shared();

        debug!(%key, generation, "request lock acquired");
        LockEntry {
            outcome,
            created_at: now,
            generation,
            waiters: 1,
            settled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manjaka_core::{Method, Params};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key(path: &str) -> RequestKey {
        RequestKey::new(Method::GET, path, &Params::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_after_grace_period() {
        let locks = RequestLockManager::<Value>::default();
        let accounts = key("/comptes");

        locks
            .with_lock(accounts.clone(), || async { Ok(json!([])) })
            .await
            .unwrap();
        assert!(locks.is_locked(&accounts));
        assert_eq!(locks.in_flight(), 0);

        tokio::time::sleep(Duration::from_millis(101)).await;
        assert!(!locks.is_locked(&accounts));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_absorbs_late_callers() {
        let locks = RequestLockManager::<u32>::default();
        let stats = key("/stats");

        let first = locks.with_lock(stats.clone(), || async { Ok(1) }).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let late = locks
            .with_lock(stats.clone(), || async { Ok(2) })
            .await;

        assert_eq!(first.unwrap(), 1);
        assert_eq!(late.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lock_is_replaced() {
        let locks = RequestLockManager::<u32>::default();
        let stuck = key("/transactions");

        let hung = tokio::spawn({
            let locks = locks.clone();
            let stuck = stuck.clone();
            async move {
                locks
                    .with_lock(stuck, || futures::future::pending::<Result<u32, ApiError>>())
                    .await
            }
        });
        tokio::task::yield_now().await;
        assert_eq!(locks.in_flight(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let fresh = locks.with_lock(stuck.clone(), || async { Ok(7) }).await;
        assert_eq!(fresh.unwrap(), 7);

        hung.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_survives_cancelled_callers() {
        let locks = RequestLockManager::<u32>::default();
        let slow = key("/stats/annuel");
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            locks.with_lock(slow.clone(), move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = done_tx.send(());
                Ok(3)
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(locks.is_locked(&slow));

        // A caller arriving while the orphaned producer runs still joins it.
        let joined = locks.with_lock(slow.clone(), || async { Ok(99) }).await;
        assert_eq!(joined.unwrap(), 3);
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forgotten_lock_is_not_joined() {
        let locks = RequestLockManager::<u32>::default();
        let accounts = key("/comptes");

        locks.with_lock(accounts.clone(), || async { Ok(1) }).await.unwrap();
        assert!(locks.forget(&accounts));

        let fresh = locks.with_lock(accounts.clone(), || async { Ok(2) }).await;
        assert_eq!(fresh.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_forget_matching() {
        let locks = RequestLockManager::<u32>::default();
        for path in ["/stats", "/stats/annuel", "/comptes"] {
            locks.with_lock(key(path), || async { Ok(0) }).await.unwrap();
        }

        let pattern = Regex::new(r"^GET:/stats(?:[/?#]|$)").unwrap();
        assert_eq!(locks.forget_matching(&pattern), 2);
        assert!(locks.is_locked(&key("/comptes")));
    }

    #[tokio::test]
    async fn test_clear_drops_locks() {
        let locks = RequestLockManager::<u32>::new(&LockConfig {
            grace_period: Duration::from_secs(60),
            ..LockConfig::default()
        });
        locks.with_lock(key("/a"), || async { Ok(1) }).await.unwrap();
        locks.with_lock(key("/b"), || async { Ok(2) }).await.unwrap();
        assert_eq!(locks.len(), 2);

        locks.clear();
        assert!(locks.is_empty());
    }
}
