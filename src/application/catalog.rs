//! Cached read operations over the catalog and snapshot repositories.

use std::sync::Arc;

use crate::application::context::RequestContext;
use crate::application::error::ServiceError;
use crate::application::repos::{CatalogRepo, SnapshotRepo};
use crate::cache::{CacheKey, CachePolicy, CacheStore, Coalescer, Operation, ReadThrough};
use crate::domain::catalog::{CatalogPage, CategoryCount, PriceRange, SuggestionRow};
use crate::domain::filters::{Availability, CatalogFilters, PriceRangeFilters};
use crate::domain::snapshots::{HistoryWindow, SnapshotRow};

pub const DEFAULT_MAX_PAGE_SIZE: u32 = 200;
/// Smallest accepted page-size ceiling.
pub const MIN_MAX_PAGE_SIZE: u32 = 10;

/// One coalescing table per operation, owned by the service instance.
struct CoalescingGroups {
    catalog: Coalescer<CatalogPage, ServiceError>,
    suggest: Coalescer<Vec<SuggestionRow>, ServiceError>,
    product: Coalescer<Vec<SnapshotRow>, ServiceError>,
    recent: Coalescer<Vec<SnapshotRow>, ServiceError>,
    categories: Coalescer<Vec<CategoryCount>, ServiceError>,
    price_range: Coalescer<PriceRange, ServiceError>,
}

impl CoalescingGroups {
    fn new() -> Self {
        Self {
            catalog: Coalescer::new(Operation::Catalog.as_str()),
            suggest: Coalescer::new(Operation::Suggest.as_str()),
            product: Coalescer::new(Operation::Product.as_str()),
            recent: Coalescer::new(Operation::Recent.as_str()),
            categories: Coalescer::new(Operation::Categories.as_str()),
            price_range: Coalescer::new(Operation::PriceRange.as_str()),
        }
    }
}

/// Read-through cached access to catalog data.
///
/// Each operation builds its key, then defers to [`ReadThrough::fetch`] with
/// the operation's TTL and a loader calling the matching repository method.
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepo>,
    snapshots: Arc<dyn SnapshotRepo>,
    cache: ReadThrough,
    policy: CachePolicy,
    max_page_size: u32,
    groups: CoalescingGroups,
}

impl CatalogService {
    /// `store` of `None` disables caching without disabling coalescing.
    pub fn new(
        catalog: Arc<dyn CatalogRepo>,
        snapshots: Arc<dyn SnapshotRepo>,
        store: Option<Arc<dyn CacheStore>>,
        policy: CachePolicy,
        max_page_size: u32,
    ) -> Self {
        Self {
            catalog,
            snapshots,
            cache: ReadThrough::new(store, policy.namespace()),
            policy,
            max_page_size: max_page_size.max(MIN_MAX_PAGE_SIZE),
            groups: CoalescingGroups::new(),
        }
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// One page of catalog rows. The page size is clamped before keying, so
    /// oversized requests share the entry of the clamped request.
    pub async fn catalog(
        &self,
        ctx: &RequestContext,
        filters: CatalogFilters,
    ) -> Result<CatalogPage, ServiceError> {
        let filters = filters.bounded(self.max_page_size);
        let key = CacheKey::catalog(&filters);
        let repo = Arc::clone(&self.catalog);
        self.cache
            .fetch(
                &self.groups.catalog,
                key,
                self.policy.ttl(Operation::Catalog),
                ctx,
                move || async move { repo.fetch_page(&filters).await },
            )
            .await
    }

    pub async fn suggest(
        &self,
        ctx: &RequestContext,
        query: &str,
        availability: Availability,
        limit: u32,
    ) -> Result<Vec<SuggestionRow>, ServiceError> {
        let key = CacheKey::suggest(query, availability, limit);
        let repo = Arc::clone(&self.catalog);
        let query = query.to_string();
        self.cache
            .fetch(
                &self.groups.suggest,
                key,
                self.policy.ttl(Operation::Suggest),
                ctx,
                move || async move { repo.search(&query, availability, limit).await },
            )
            .await
    }

    /// Snapshot history of one product, oldest first.
    pub async fn product_snapshots(
        &self,
        ctx: &RequestContext,
        slug: &str,
        window: HistoryWindow,
    ) -> Result<Vec<SnapshotRow>, ServiceError> {
        let key = CacheKey::product(slug, window);
        let repo = Arc::clone(&self.snapshots);
        let slug = slug.trim().to_lowercase();
        self.cache
            .fetch(
                &self.groups.product,
                key,
                self.policy.ttl(Operation::Product),
                ctx,
                move || async move { repo.by_slug(&slug, window).await },
            )
            .await
    }

    pub async fn recent_snapshots(
        &self,
        ctx: &RequestContext,
        limit: u32,
    ) -> Result<Vec<SnapshotRow>, ServiceError> {
        let key = CacheKey::recent(limit);
        let repo = Arc::clone(&self.snapshots);
        self.cache
            .fetch(
                &self.groups.recent,
                key,
                self.policy.ttl(Operation::Recent),
                ctx,
                move || async move { repo.recent(limit).await },
            )
            .await
    }

    pub async fn category_counts(
        &self,
        ctx: &RequestContext,
        availability: Availability,
    ) -> Result<Vec<CategoryCount>, ServiceError> {
        let key = CacheKey::categories(availability);
        let repo = Arc::clone(&self.catalog);
        self.cache
            .fetch(
                &self.groups.categories,
                key,
                self.policy.ttl(Operation::Categories),
                ctx,
                move || async move { repo.category_counts(availability).await },
            )
            .await
    }

    pub async fn price_range(
        &self,
        ctx: &RequestContext,
        filters: PriceRangeFilters,
    ) -> Result<PriceRange, ServiceError> {
        let key = CacheKey::price_range(&filters);
        let repo = Arc::clone(&self.catalog);
        self.cache
            .fetch(
                &self.groups.price_range,
                key,
                self.policy.ttl(Operation::PriceRange),
                ctx,
                move || async move { repo.price_range(&filters).await },
            )
            .await
    }
}
