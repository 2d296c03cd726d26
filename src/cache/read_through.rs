//! Read-through caching with request coalescing.
//!
//! [`ReadThrough::fetch`] is the single path every cached operation takes:
//! look up the store, on a miss join or lead a coalesced load, re-check the
//! store inside the load, call the repository under the caller's context, then
//! write the fresh value back. Store failures never reach the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::coalesce::Coalescer;
use super::keys::{CacheKey, Operation};
use super::store::{CacheStore, NoopCacheStore};
use crate::application::context::RequestContext;
use crate::application::error::ServiceError;
use crate::application::repos::RepoError;

const METRIC_CACHE_HIT: &str = "catalogd_cache_hit_total";
const METRIC_CACHE_MISS: &str = "catalogd_cache_miss_total";
const METRIC_CACHE_DECODE_ERROR: &str = "catalogd_cache_decode_error_total";
const METRIC_CACHE_WRITE_ERROR: &str = "catalogd_cache_write_error_total";
const METRIC_REPOSITORY_FETCH_MS: &str = "catalogd_repository_fetch_ms";

#[derive(Clone)]
pub struct ReadThrough {
    store: Arc<dyn CacheStore>,
    namespace: Option<Arc<str>>,
}

impl ReadThrough {
    /// `None` selects a store that always misses.
    pub fn new(store: Option<Arc<dyn CacheStore>>, namespace: Option<&str>) -> Self {
        Self {
            store: store.unwrap_or_else(|| Arc::new(NoopCacheStore)),
            namespace: namespace.map(Arc::from),
        }
    }

    /// Key under which `key` is stored, namespace included.
    pub fn storage_key(&self, key: &CacheKey) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{}", key.as_str()),
            None => key.as_str().to_string(),
        }
    }

    /// Serve `key` from the store, or load it once for all concurrent callers.
    ///
    /// `ttl` of `None` bypasses the store entirely; concurrent callers are
    /// still coalesced. The caller's context bounds only the repository call
    /// made by the leader, so waiters observe the leader's deadline or
    /// cancellation along with its result.
    pub async fn fetch<T, F, Fut>(
        &self,
        coalescer: &Coalescer<T, ServiceError>,
        key: CacheKey,
        ttl: Option<Duration>,
        ctx: &RequestContext,
        load: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RepoError>> + Send + 'static,
    {
        let operation = key.operation();
        let storage_key = self.storage_key(&key);

        if ttl.is_some() {
            if let Some(value) = self.read::<T>(operation, &storage_key).await {
                counter!(METRIC_CACHE_HIT, "operation" => operation.as_str()).increment(1);
                debug!(
                    operation = operation.as_str(),
                    key = %storage_key,
                    result = "hit",
                    "Cache lookup"
                );
                return Ok(value);
            }
            counter!(METRIC_CACHE_MISS, "operation" => operation.as_str()).increment(1);
            debug!(
                operation = operation.as_str(),
                key = %storage_key,
                result = "miss",
                "Cache lookup"
            );
        }

        let this = self.clone();
        let ctx = ctx.clone();
        let group_key = storage_key.clone();
        coalescer
            .execute(&group_key, move || async move {
                this.load(operation, storage_key, ttl, &ctx, load).await
            })
            .await
    }

    async fn load<T, F, Fut>(
        &self,
        operation: Operation,
        storage_key: String,
        ttl: Option<Duration>,
        ctx: &RequestContext,
        load: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        // Another group may have filled the entry since the first lookup.
        if ttl.is_some()
            && let Some(value) = self.read::<T>(operation, &storage_key).await
        {
            debug!(
                operation = operation.as_str(),
                key = %storage_key,
                result = "hit_within_flight",
                "Cache lookup"
            );
            return Ok(value);
        }

        let started = Instant::now();
        let outcome = ctx.run(load()).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_REPOSITORY_FETCH_MS, "operation" => operation.as_str())
            .record(elapsed_ms);

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                warn!(
                    operation = operation.as_str(),
                    key = %storage_key,
                    duration_ms = elapsed_ms,
                    error = %err,
                    "Repository fetch failed"
                );
                return Err(ServiceError::from(err));
            }
            Err(err) => {
                warn!(
                    operation = operation.as_str(),
                    key = %storage_key,
                    duration_ms = elapsed_ms,
                    error = %err,
                    "Repository fetch interrupted"
                );
                return Err(ServiceError::from(err));
            }
        };
        debug!(
            operation = operation.as_str(),
            key = %storage_key,
            duration_ms = elapsed_ms,
            "Repository fetch completed"
        );

        if let Some(ttl) = ttl {
            self.write(operation, &storage_key, &value, ttl).await;
        }
        Ok(value)
    }

    async fn read<T: DeserializeOwned>(&self, operation: Operation, key: &str) -> Option<T> {
        let payload = match self.store.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(
                    operation = operation.as_str(),
                    key,
                    error = %err,
                    "Cache read failed; treating as miss"
                );
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                counter!(METRIC_CACHE_DECODE_ERROR, "operation" => operation.as_str())
                    .increment(1);
                warn!(
                    operation = operation.as_str(),
                    key,
                    error = %err,
                    "Cached payload did not decode; treating as miss"
                );
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, operation: Operation, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_ERROR, "operation" => operation.as_str()).increment(1);
                warn!(
                    operation = operation.as_str(),
                    key,
                    error = %err,
                    "Failed to encode value for cache"
                );
                return;
            }
        };

        if let Err(err) = self.store.set(key, payload, ttl).await {
            counter!(METRIC_CACHE_WRITE_ERROR, "operation" => operation.as_str()).increment(1);
            warn!(
                operation = operation.as_str(),
                key,
                error = %err,
                "Cache write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::store::CacheStoreError;

    #[derive(Default)]
    struct RecordingStore {
        payload: Mutex<Option<String>>,
        writes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CacheStore for RecordingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheStoreError> {
            if self.fail {
                return Err(CacheStoreError::Unavailable("down".into()));
            }
            Ok(self.payload.lock().expect("payload lock").clone())
        }

        async fn set(
            &self,
            _key: &str,
            value: String,
            _ttl: Duration,
        ) -> Result<(), CacheStoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CacheStoreError::Unavailable("down".into()));
            }
            *self.payload.lock().expect("payload lock") = Some(value);
            Ok(())
        }
    }

    const TTL: Option<Duration> = Some(Duration::from_secs(60));

    #[test]
    fn storage_key_applies_namespace() {
        let key = CacheKey::recent(50);
        let namespaced = ReadThrough::new(None, Some("api-v1"));
        assert_eq!(namespaced.storage_key(&key), "api-v1:recent:limit=50");
        let bare = ReadThrough::new(None, None);
        assert_eq!(bare.storage_key(&key), "recent:limit=50");
    }

    #[tokio::test]
    async fn miss_loads_and_writes_then_hit_skips_loader() {
        let store = Arc::new(RecordingStore::default());
        let cache = ReadThrough::new(Some(store.clone() as Arc<dyn CacheStore>), None);
        let coalescer = Coalescer::<Vec<u32>, ServiceError>::new("recent");
        let ctx = RequestContext::background();

        let first = cache
            .fetch(&coalescer, CacheKey::recent(3), TTL, &ctx, || async {
                Ok(vec![1, 2, 3])
            })
            .await;
        assert_eq!(first, Ok(vec![1, 2, 3]));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let second = cache
            .fetch(&coalescer, CacheKey::recent(3), TTL, &ctx, || async {
                Err(RepoError::from_persistence("must not be called"))
            })
            .await;
        assert_eq!(second, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let store = Arc::new(RecordingStore {
            payload: Mutex::new(Some("{not json".to_string())),
            ..Default::default()
        });
        let cache = ReadThrough::new(Some(store.clone() as Arc<dyn CacheStore>), None);
        let coalescer = Coalescer::<Vec<u32>, ServiceError>::new("recent");

        let value = cache
            .fetch(
                &coalescer,
                CacheKey::recent(1),
                TTL,
                &RequestContext::background(),
                || async { Ok(vec![9]) },
            )
            .await;
        assert_eq!(value, Ok(vec![9]));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failures_degrade_to_repository() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let cache = ReadThrough::new(Some(store as Arc<dyn CacheStore>), None);
        let coalescer = Coalescer::<Vec<u32>, ServiceError>::new("recent");

        let value = cache
            .fetch(
                &coalescer,
                CacheKey::recent(1),
                TTL,
                &RequestContext::background(),
                || async { Ok(vec![4]) },
            )
            .await;
        assert_eq!(value, Ok(vec![4]));
    }

    #[tokio::test]
    async fn disabled_ttl_neither_reads_nor_writes() {
        let store = Arc::new(RecordingStore {
            payload: Mutex::new(Some("[7]".to_string())),
            ..Default::default()
        });
        let cache = ReadThrough::new(Some(store.clone() as Arc<dyn CacheStore>), None);
        let coalescer = Coalescer::<Vec<u32>, ServiceError>::new("recent");

        let value = cache
            .fetch(
                &coalescer,
                CacheKey::recent(1),
                None,
                &RequestContext::background(),
                || async { Ok(vec![8]) },
            )
            .await;
        assert_eq!(value, Ok(vec![8]));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repository_errors_propagate_and_are_not_cached() {
        let store = Arc::new(RecordingStore::default());
        let cache = ReadThrough::new(Some(store.clone() as Arc<dyn CacheStore>), None);
        let coalescer = Coalescer::<Vec<u32>, ServiceError>::new("recent");

        let value = cache
            .fetch(
                &coalescer,
                CacheKey::recent(1),
                TTL,
                &RequestContext::background(),
                || async { Err(RepoError::Timeout) },
            )
            .await;
        assert_eq!(value, Err(ServiceError::Repo(RepoError::Timeout)));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_context_surfaces_deadline() {
        let cache = ReadThrough::new(None, None);
        let coalescer = Coalescer::<Vec<u32>, ServiceError>::new("recent");
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));

        let value = cache
            .fetch(&coalescer, CacheKey::recent(1), TTL, &ctx, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(vec![1])
            })
            .await;
        assert_eq!(value, Err(ServiceError::DeadlineExceeded));
    }
}
