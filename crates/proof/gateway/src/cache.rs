//! Proof cache with in-flight deduplication.
//!
//! Resolved values live in a bounded LRU. Keys that are being fetched live in a
//! separate pending map holding a shared future, so concurrent requesters await
//! the same fetch and LRU eviction can never drop a fetch that is still running.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    hash::Hash,
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
};

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::metrics as gateway_metrics;
use crate::rpc::{RpcError, RpcResult};

/// A fetch in flight, shared by every task waiting on it.
pub type PendingProof<V> = Shared<BoxFuture<'static, RpcResult<V>>>;

/// Cache metrics for tracking hit/miss rates.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Number of cache hits.
    hits: AtomicU64,
    /// Number of cache misses.
    misses: AtomicU64,
}

impl CacheMetrics {
    /// Creates a new cache metrics instance.
    pub const fn new() -> Self {
        Self { hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// Records a cache hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of cache hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the total number of cache accesses.
    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Returns the cache hit rate as a percentage (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

/// State of a present cache key.
#[derive(Clone)]
pub enum CacheEntry<V: Clone> {
    /// A fetch for this key is in flight.
    Pending(PendingProof<V>),
    /// The value is available.
    Resolved(V),
}

impl<V: Clone> CacheEntry<V> {
    /// Returns the value, awaiting the in-flight fetch if there is one.
    pub async fn wait(self) -> RpcResult<V> {
        match self {
            Self::Pending(pending) => pending.await,
            Self::Resolved(value) => Ok(value),
        }
    }

    /// Returns the value if it is already available.
    pub const fn resolved(&self) -> Option<&V> {
        match self {
            Self::Pending(_) => None,
            Self::Resolved(value) => Some(value),
        }
    }
}

impl<V: Clone + fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(_) => f.write_str("Pending"),
            Self::Resolved(value) => f.debug_tuple("Resolved").field(value).finish(),
        }
    }
}

/// The settling half of a pending fetch.
///
/// Dropping it without calling [`Deferred::settle`] fails every waiter with
/// [`RpcError::Abandoned`].
#[derive(Debug)]
pub struct Deferred<V> {
    sender: oneshot::Sender<RpcResult<V>>,
}

impl<V> Deferred<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a resolver together with the shared future it settles.
    pub fn new() -> (Self, PendingProof<V>) {
        let (sender, receiver) = oneshot::channel();
        let pending = async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(RpcError::Abandoned("fetch dropped before settling".into())))
        }
        .boxed()
        .shared();
        (Self { sender }, pending)
    }

    /// Settles the shared future. Waiters that already went away are ignored.
    pub fn settle(self, result: RpcResult<V>) {
        let _ = self.sender.send(result);
    }
}

/// Releases reserved keys that are still pending when dropped.
///
/// Held by the task that reserved the keys for the duration of the fetch, so a
/// cancelled fetch cannot leave a key pending forever.
pub struct Reservation<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    cache: &'a ProofCache<K, V>,
    keys: Vec<K>,
}

impl<'a, K, V> Reservation<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty reservation on `cache`.
    pub const fn new(cache: &'a ProofCache<K, V>) -> Self {
        Self { cache, keys: Vec::new() }
    }

    /// Tracks a key reserved by the owner.
    pub fn push(&mut self, key: K) {
        self.keys.push(key);
    }

    /// Returns the tracked keys.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Returns true if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Stops tracking the keys. Call once every key has been resolved or released.
    pub fn complete(mut self) {
        self.keys.clear();
    }
}

impl<K, V> Drop for Reservation<'_, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        for key in self.keys.drain(..) {
            self.cache.release(&key);
        }
    }
}

impl<K, V> fmt::Debug for Reservation<'_, K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("keys", &self.keys).finish_non_exhaustive()
    }
}

struct CacheState<K: Hash + Eq, V> {
    resolved: LruCache<K, V>,
    pending: HashMap<K, PendingProof<V>>,
}

/// A bounded, metered cache of proofs keyed by what they prove.
pub struct ProofCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    state: Mutex<CacheState<K, V>>,
    metrics: CacheMetrics,
    name: String,
}

impl<K, V> ProofCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` resolved values.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                resolved: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
            metrics: CacheMetrics::new(),
            name: name.into(),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.metrics.record_hit();
            metrics::counter!(gateway_metrics::CACHE_HITS_TOTAL, gateway_metrics::LABEL_CACHE_NAME => self.name.clone()).increment(1);
        } else {
            self.metrics.record_miss();
            metrics::counter!(gateway_metrics::CACHE_MISSES_TOTAL, gateway_metrics::LABEL_CACHE_NAME => self.name.clone()).increment(1);
        }
    }

    /// Looks up a key, refreshing its recency.
    pub fn touch(&self, key: &K) -> Option<CacheEntry<V>> {
        let entry = {
            let mut state = self.state.lock();
            lookup(&mut state, key)
        };
        self.record(entry.is_some());
        entry
    }

    /// Looks up a key without refreshing its recency or counting an access.
    pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        let state = self.state.lock();
        if let Some(value) = state.resolved.peek(key) {
            return Some(CacheEntry::Resolved(value.clone()));
        }
        state.pending.get(key).cloned().map(CacheEntry::Pending)
    }

    /// Marks a key as being fetched, replacing any previous entry.
    pub fn set_pending(&self, key: K, pending: PendingProof<V>) {
        let mut state = self.state.lock();
        state.resolved.pop(&key);
        state.pending.insert(key, pending);
    }

    /// Returns the current entry of `key`, or marks it pending with `reserve()`
    /// and returns `None`. The check and the reservation are one atomic step.
    pub fn touch_or_reserve(
        &self,
        key: K,
        reserve: impl FnOnce() -> PendingProof<V>,
    ) -> Option<CacheEntry<V>> {
        let entry = {
            let mut state = self.state.lock();
            let entry = lookup(&mut state, &key);
            if entry.is_none() {
                state.pending.insert(key, reserve());
            }
            entry
        };
        self.record(entry.is_some());
        entry
    }

    /// Stores the fetched value of a pending key.
    pub fn resolve(&self, key: K, value: V) {
        self.insert(key, value);
    }

    /// Drops the pending marker of `key`. Resolved values are kept.
    pub fn release(&self, key: &K) {
        self.state.lock().pending.remove(key);
    }

    /// Inserts a resolved value, evicting the least recently used one if full.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        state.pending.remove(&key);
        state.resolved.put(key, value);
    }

    /// Returns the cached value of `key`, running `fetch` if nobody has.
    ///
    /// Concurrent callers for the same key share one `fetch`. A failed fetch is
    /// not cached: every waiter observes the error and the next call retries.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> RpcResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RpcResult<V>>,
        V: Send + Sync + 'static,
    {
        let (deferred, pending) = Deferred::new();
        if let Some(entry) = self.touch_or_reserve(key.clone(), || pending) {
            return entry.wait().await;
        }

        let mut reservation = Reservation::new(self);
        reservation.push(key.clone());

        let result = fetch().await;
        match &result {
            Ok(value) => self.resolve(key, value.clone()),
            Err(err) => {
                debug!(cache = %self.name, error = %err, "Fetch failed, releasing key");
                self.release(&key);
            }
        }
        reservation.complete();
        deferred.settle(result.clone());
        result
    }

    /// Returns the number of resolved values.
    pub fn len(&self) -> usize {
        self.state.lock().resolved.len()
    }

    /// Returns true if no value is resolved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of keys being fetched.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns the cache metrics.
    pub const fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Returns the cache name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn lookup<K: Hash + Eq, V: Clone>(state: &mut CacheState<K, V>, key: &K) -> Option<CacheEntry<V>> {
    if let Some(value) = state.resolved.get(key) {
        return Some(CacheEntry::Resolved(value.clone()));
    }
    state.pending.get(key).cloned().map(CacheEntry::Pending)
}

impl<K, V> fmt::Debug for ProofCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProofCache")
            .field("name", &self.name)
            .field("len", &state.resolved.len())
            .field("pending", &state.pending.len())
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn test_cache_metrics() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        assert_eq!(metrics.hits(), 2);
        assert_eq!(metrics.misses(), 1);
        assert_eq!(metrics.total(), 3);
        assert!((metrics.hit_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_touch_hit_miss() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 4);

        assert!(cache.touch(&1).is_none());
        assert_eq!(cache.metrics().misses(), 1);

        cache.insert(1, 10);
        assert_eq!(cache.touch(&1).and_then(|e| e.resolved().copied()), Some(10));
        assert_eq!(cache.metrics().hits(), 1);
    }

    #[test]
    fn test_touch_refreshes_recency_peek_does_not() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 2);
        cache.insert(1, 10);
        cache.insert(2, 20);

        // 1 becomes most recent, so inserting 3 evicts 2.
        assert!(cache.touch(&1).is_some());
        cache.insert(3, 30);
        assert!(cache.peek(&2).is_none());
        assert!(cache.peek(&1).is_some());

        // peek leaves 1 as least recent, so inserting 4 evicts it.
        assert!(cache.peek(&1).is_some());
        cache.insert(4, 40);
        assert!(cache.peek(&1).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_peek_does_not_count() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 2);
        cache.insert(1, 10);
        assert!(cache.peek(&1).is_some());
        assert!(cache.peek(&2).is_none());
        assert_eq!(cache.metrics().total(), 0);
    }

    #[tokio::test]
    async fn test_pending_is_never_evicted() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 1);
        let (deferred, pending) = Deferred::new();
        cache.set_pending(1, pending);

        for key in 2..10 {
            cache.insert(key, key);
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pending_len(), 1);

        let entry = cache.peek(&1).unwrap();
        assert!(entry.resolved().is_none());
        deferred.settle(Ok(7));
        assert_eq!(entry.wait().await, Ok(7));
    }

    #[test]
    fn test_touch_or_reserve_is_exclusive() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 4);
        let (_deferred, pending) = Deferred::new();

        assert!(cache.touch_or_reserve(1, || pending.clone()).is_none());
        assert!(matches!(
            cache.touch_or_reserve(1, || unreachable!("already reserved")),
            Some(CacheEntry::Pending(_))
        ));
        assert_eq!(cache.pending_len(), 1);
    }

    #[test]
    fn test_release_keeps_resolved() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 4);
        let (_deferred, pending) = Deferred::new();
        cache.set_pending(1, pending);
        cache.release(&1);
        assert!(cache.peek(&1).is_none());

        cache.insert(2, 20);
        cache.release(&2);
        assert!(cache.peek(&2).is_some());
    }

    #[tokio::test]
    async fn test_get_dedups_concurrent_fetches() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 4);
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(42)
            }
        };

        let (a, b, c) = tokio::join!(cache.get(1, fetch), cache.get(1, fetch), cache.get(1, fetch));
        assert_eq!((a, b, c), (Ok(42), Ok(42), Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_failure_is_shared_then_retried() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 4);
        let failing = || async {
            tokio::task::yield_now().await;
            Err(RpcError::ProofNotFound("0x1".into()))
        };

        let (a, b) = tokio::join!(cache.get(1, failing), cache.get(1, || async { Ok(1) }));
        assert_eq!(a, Err(RpcError::ProofNotFound("0x1".into())));
        assert_eq!(b, Err(RpcError::ProofNotFound("0x1".into())));
        assert_eq!(cache.pending_len(), 0);

        assert_eq!(cache.get(1, || async { Ok(5) }).await, Ok(5));
    }

    #[tokio::test]
    async fn test_dropped_reservation_abandons_waiters() {
        let cache: ProofCache<u64, u64> = ProofCache::new("test", 4);
        let (deferred, pending) = Deferred::new();
        assert!(cache.touch_or_reserve(1, || pending).is_none());

        let mut reservation = Reservation::new(&cache);
        reservation.push(1);
        let waiter = cache.peek(&1).unwrap();

        drop(reservation);
        drop(deferred);

        assert_eq!(cache.pending_len(), 0);
        assert!(matches!(waiter.wait().await, Err(RpcError::Abandoned(_))));
    }
}
