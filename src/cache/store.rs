//! Key-value stores backing the read-through cache.
//!
//! The orchestrator only relies on the `get`/`set` contract. Any store error
//! is treated as a miss or a skipped write by the caller.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::config::MAX_TTL;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_EVICT: &str = "catalogd_cache_evict_total";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected operation: {0}")]
    Backend(String),
}

/// Serialized payload store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Return the payload stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError>;
}

/// Store used when caching is switched off: always misses, never stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheStoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheStoreError> {
        Ok(())
    }
}

struct Entry {
    payload: String,
    expires_at: Instant,
}

/// In-process LRU store with TTL expiry.
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.payload.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Expiry is capped at `now + MAX_TTL`; a write whose expiry cannot be
    /// represented is skipped.
    fn set_at(&self, key: &str, payload: String, ttl: Duration, now: Instant) {
        let Some(expires_at) = now.checked_add(ttl.min(MAX_TTL)) else {
            return;
        };
        let entry = Entry { payload, expires_at };
        let evicted = mutex_lock(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        Ok(self.get_at(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.set_at(key, value, ttl, Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn store(capacity: usize) -> MemoryCacheStore {
        MemoryCacheStore::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    #[tokio::test]
    async fn noop_store_always_misses() {
        let store = NoopCacheStore;
        store
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .expect("noop set succeeds");
        assert_eq!(store.get("k").await, Ok(None));
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = store(4);
        assert_eq!(store.get("k").await, Ok(None));
        store
            .set("k", "payload".to_string(), Duration::from_secs(60))
            .await
            .expect("set succeeds");
        assert_eq!(store.get("k").await, Ok(Some("payload".to_string())));
    }

    #[test]
    fn expired_entries_miss_and_are_dropped() {
        let store = store(4);
        let now = Instant::now();
        store.set_at("k", "payload".to_string(), Duration::from_secs(5), now);

        assert_eq!(
            store.get_at("k", now + Duration::from_secs(4)),
            Some("payload".to_string())
        );
        assert_eq!(store.get_at("k", now + Duration::from_secs(5)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn oversized_ttl_is_capped_instead_of_overflowing() {
        let store = store(4);
        let now = Instant::now();
        store.set_at("k", "payload".to_string(), Duration::MAX, now);

        assert_eq!(
            store.get_at("k", now + Duration::from_secs(3600)),
            Some("payload".to_string())
        );
        assert_eq!(store.get_at("k", now + MAX_TTL), None);
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let store = store(4);
        store
            .set("k", "payload".to_string(), Duration::ZERO)
            .await
            .expect("set succeeds");
        assert!(store.is_empty());
    }

    #[test]
    fn lru_eviction_keeps_recent_keys() {
        let store = store(2);
        let now = Instant::now();
        let ttl = Duration::from_secs(60);
        store.set_at("a", "1".to_string(), ttl, now);
        store.set_at("b", "2".to_string(), ttl, now);
        assert!(store.get_at("a", now).is_some());
        store.set_at("c", "3".to_string(), ttl, now);

        assert!(store.get_at("a", now).is_some());
        assert!(store.get_at("b", now).is_none());
        assert!(store.get_at("c", now).is_some());
    }

    #[test]
    fn memory_store_recovers_from_poisoned_lock() {
        let store = store(2);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .lock()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set_at("k", "v".to_string(), Duration::from_secs(1), Instant::now());
        assert_eq!(store.len(), 1);
    }
}
