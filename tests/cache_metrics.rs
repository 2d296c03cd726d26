mod support;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalogd::application::catalog::CatalogService;
use catalogd::application::context::RequestContext;
use catalogd::cache::{
    CacheKey, CachePolicy, CacheStore, CacheStoreError, MemoryCacheStore, ReadThrough,
};
use catalogd::domain::filters::Availability;
use metrics_util::debugging::DebuggingRecorder;

use support::FakeRepos;

struct WriteFailingStore;

#[async_trait]
impl CacheStore for WriteFailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheStoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheStoreError> {
        Err(CacheStoreError::Backend("disk full".to_string()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_through_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let ctx = RequestContext::background();

    // Capacity of one forces an eviction on the second distinct key.
    let store = Arc::new(MemoryCacheStore::new(
        NonZeroUsize::new(1).expect("non-zero capacity"),
    ));
    let garbage_key =
        ReadThrough::new(None, Some("api-v1")).storage_key(&CacheKey::recent(7));
    store
        .set(&garbage_key, "not json".to_string(), Duration::from_secs(60))
        .await
        .expect("seed store");

    let repos = Arc::new(FakeRepos::slow(Duration::from_millis(100)));
    let service = Arc::new(CatalogService::new(
        repos.clone(),
        repos.clone(),
        Some(store as Arc<dyn CacheStore>),
        CachePolicy::default(),
        200,
    ));

    // Decode error, miss, fetch histogram.
    service.recent_snapshots(&ctx, 7).await.expect("recent loads");
    // Hit.
    service.recent_snapshots(&ctx, 7).await.expect("recent cached");

    // Concurrent callers: one leader, one shared result. Also evicts `recent`.
    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .category_counts(&RequestContext::background(), Availability::Any)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .category_counts(&RequestContext::background(), Availability::Any)
                .await
        })
    };
    first.await.expect("task joins").expect("categories load");
    second.await.expect("task joins").expect("categories load");

    // Write failure.
    let failing = CatalogService::new(
        repos.clone(),
        repos,
        Some(Arc::new(WriteFailingStore) as Arc<dyn CacheStore>),
        CachePolicy::default(),
        200,
    );
    failing
        .price_range(&ctx, Default::default())
        .await
        .expect("write failures are not fatal");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "catalogd_cache_hit_total",
        "catalogd_cache_miss_total",
        "catalogd_cache_decode_error_total",
        "catalogd_cache_write_error_total",
        "catalogd_cache_evict_total",
        "catalogd_coalesce_shared_total",
        "catalogd_repository_fetch_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
