#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalogd::application::repos::{CatalogRepo, RepoError, SnapshotRepo};
use catalogd::domain::catalog::{CatalogPage, CatalogRow, CategoryCount, PriceRange, SuggestionRow};
use catalogd::domain::filters::{Availability, CatalogFilters, PriceRangeFilters};
use catalogd::domain::snapshots::{HistoryWindow, SnapshotRow};
use serde_json::json;
use time::macros::datetime;

/// In-memory stand-in for both repositories, counting every call.
#[derive(Default)]
pub struct FakeRepos {
    pub page_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub category_calls: AtomicUsize,
    pub price_range_calls: AtomicUsize,
    pub slug_calls: AtomicUsize,
    pub recent_calls: AtomicUsize,
    pub last_slug: Mutex<Option<String>>,
    delay: Duration,
    failure: Option<RepoError>,
}

impl FakeRepos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: RepoError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn total_calls(&self) -> usize {
        [
            &self.page_calls,
            &self.search_calls,
            &self.category_calls,
            &self.price_range_calls,
            &self.slug_calls,
            &self.recent_calls,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }

    async fn answer<T>(&self, counter: &AtomicUsize, value: T) -> Result<T, RepoError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(value),
        }
    }
}

#[async_trait]
impl CatalogRepo for FakeRepos {
    async fn fetch_page(&self, filters: &CatalogFilters) -> Result<CatalogPage, RepoError> {
        let rows = (0..filters.limit.min(3))
            .map(|idx| catalog_row(&format!("SKU-{idx}")))
            .collect();
        self.answer(&self.page_calls, CatalogPage { rows, total: 42 })
            .await
    }

    async fn search(
        &self,
        query: &str,
        _availability: Availability,
        _limit: u32,
    ) -> Result<Vec<SuggestionRow>, RepoError> {
        let rows = vec![suggestion_row(query)];
        self.answer(&self.search_calls, rows).await
    }

    async fn category_counts(
        &self,
        _availability: Availability,
    ) -> Result<Vec<CategoryCount>, RepoError> {
        let rows = vec![
            CategoryCount {
                category: "strategy".to_string(),
                count: 12,
            },
            CategoryCount {
                category: "family".to_string(),
                count: 7,
            },
        ];
        self.answer(&self.category_calls, rows).await
    }

    async fn price_range(&self, _filters: &PriceRangeFilters) -> Result<PriceRange, RepoError> {
        let range = PriceRange {
            min_price: Some(9.5),
            max_price: Some(120.0),
        };
        self.answer(&self.price_range_calls, range).await
    }
}

#[async_trait]
impl SnapshotRepo for FakeRepos {
    async fn by_slug(
        &self,
        slug: &str,
        window: HistoryWindow,
    ) -> Result<Vec<SnapshotRow>, RepoError> {
        if let Ok(mut last) = self.last_slug.lock() {
            *last = Some(slug.to_string());
        }
        let points = window.limit().unwrap_or(4).min(4);
        let rows = (0..points).map(|idx| snapshot_row(i64::from(idx))).collect();
        self.answer(&self.slug_calls, rows).await
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SnapshotRow>, RepoError> {
        let rows = (0..limit.min(5))
            .rev()
            .map(|idx| snapshot_row(i64::from(idx)))
            .collect();
        self.answer(&self.recent_calls, rows).await
    }
}

pub fn catalog_row(code: &str) -> CatalogRow {
    CatalogRow {
        product_code: Some(code.to_string()),
        product_name: Some(format!("Product {code}")),
        product_name_normalized: Some(format!("product {}", code.to_lowercase())),
        product_name_search: None,
        currency_code: Some("EUR".to_string()),
        availability_label: Some("in stock".to_string()),
        stock_status_label: None,
        latest_price: Some(39.9),
        previous_price: Some(44.9),
        first_price: Some(49.9),
        list_price_with_vat: Some(49.9),
        source_url: Some(format!("https://shop.example/{code}")),
        latest_scraped_at: Some(datetime!(2025-03-01 10:00 UTC)),
        hero_image_url: None,
        gallery_image_urls: Vec::new(),
        short_description: None,
        supplementary_parameters: json!({}),
        metadata: json!({}),
        price_points: json!([]),
        category_tags: vec!["strategy".to_string()],
    }
}

pub fn suggestion_row(query: &str) -> SuggestionRow {
    SuggestionRow {
        product_code: Some("SKU-1".to_string()),
        product_name: Some(format!("{query} deluxe")),
        product_name_normalized: Some(format!("{} deluxe", query.to_lowercase())),
        product_name_search: None,
        currency_code: Some("EUR".to_string()),
        availability_label: None,
        latest_price: Some(19.0),
        hero_image_url: None,
        gallery_image_urls: Vec::new(),
        category_tags: Vec::new(),
    }
}

pub fn snapshot_row(id: i64) -> SnapshotRow {
    SnapshotRow {
        id,
        product_code: Some("SKU-1".to_string()),
        product_name_original: Some("Catan".to_string()),
        product_name_normalized: Some("catan".to_string()),
        price_with_vat: Some(30.0 + id as f64),
        list_price_with_vat: None,
        currency_code: Some("EUR".to_string()),
        source_url: None,
        scraped_at: datetime!(2025-01-01 00:00 UTC) + time::Duration::hours(id),
        availability_label: None,
        stock_status_label: None,
        hero_image_url: None,
        gallery_image_urls: Vec::new(),
        short_description: None,
        supplementary_parameters: json!({}),
        metadata: json!({"source": "fake"}),
        seller: None,
    }
}
