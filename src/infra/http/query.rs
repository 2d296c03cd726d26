//! Lenient query-string parsing.
//!
//! Values that fail to parse fall back to their defaults instead of rejecting
//! the request.

use serde::Deserialize;

use crate::domain::filters::{Availability, CatalogFilters, CategorySet, PriceRangeFilters};
use crate::domain::snapshots::HistoryWindow;

pub const DEFAULT_CATALOG_LIMIT: u32 = 20;
pub const DEFAULT_SUGGEST_LIMIT: u32 = 60;
pub const DEFAULT_RECENT_LIMIT: u32 = 2000;
pub const MAX_RECENT_LIMIT: u32 = 10_000;
/// Queries shorter than this (in characters, after trimming) get no suggestions.
pub const MIN_SUGGEST_QUERY_CHARS: usize = 2;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    availability: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    categories: Option<String>,
    q: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

impl CatalogQuery {
    pub fn into_filters(self, max_page_size: u32) -> CatalogFilters {
        CatalogFilters {
            availability: availability(self.availability.as_deref()),
            min_price: price_bound(self.min_price.as_deref()),
            max_price: price_bound(self.max_price.as_deref()),
            categories: categories(self.categories.as_deref()),
            query: self.q.as_deref().unwrap_or_default().trim().to_string(),
            limit: limit(self.limit.as_deref(), DEFAULT_CATALOG_LIMIT, max_page_size),
            offset: offset(self.offset.as_deref()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestQuery {
    q: Option<String>,
    availability: Option<String>,
    limit: Option<String>,
}

/// Parsed suggestion request; `query` is `None` when it is too short to search.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestParams {
    pub query: Option<String>,
    pub availability: Availability,
    pub limit: u32,
}

impl SuggestQuery {
    pub fn into_params(self, max_page_size: u32) -> SuggestParams {
        let query = self.q.as_deref().unwrap_or_default().trim();
        let query =
            (query.chars().count() >= MIN_SUGGEST_QUERY_CHARS).then(|| query.to_string());
        SuggestParams {
            query,
            availability: availability(self.availability.as_deref()),
            limit: limit(self.limit.as_deref(), DEFAULT_SUGGEST_LIMIT, max_page_size),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    history_points: Option<String>,
}

impl ProductQuery {
    pub fn window(&self) -> HistoryWindow {
        let requested = self
            .history_points
            .as_deref()
            .and_then(parse_int)
            .filter(|points| *points > 0)
            .map(|points| u32::try_from(points).unwrap_or(u32::MAX))
            .unwrap_or(0);
        HistoryWindow::points(requested)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    limit: Option<String>,
}

impl RecentQuery {
    pub fn limit(&self) -> u32 {
        limit(
            self.limit.as_deref(),
            DEFAULT_RECENT_LIMIT,
            MAX_RECENT_LIMIT,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    availability: Option<String>,
}

impl AvailabilityQuery {
    pub fn availability(&self) -> Availability {
        availability(self.availability.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceRangeQuery {
    availability: Option<String>,
    categories: Option<String>,
}

impl PriceRangeQuery {
    pub fn into_filters(self) -> PriceRangeFilters {
        PriceRangeFilters {
            availability: availability(self.availability.as_deref()),
            categories: categories(self.categories.as_deref()),
        }
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Requested page size; missing, unparsable or non-positive values use
/// `fallback`, larger values are capped at `max`.
fn limit(raw: Option<&str>, fallback: u32, max: u32) -> u32 {
    match raw.and_then(parse_int) {
        Some(value) if value >= 1 => u32::try_from(value).unwrap_or(u32::MAX).min(max),
        _ => fallback.min(max),
    }
}

fn offset(raw: Option<&str>) -> u32 {
    raw.and_then(parse_int)
        .filter(|value| *value > 0)
        .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn price_bound(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

fn availability(raw: Option<&str>) -> Availability {
    raw.map(Availability::parse).unwrap_or_default()
}

fn categories(raw: Option<&str>) -> CategorySet {
    raw.map(CategorySet::parse_list).unwrap_or_default()
}
