//! Catalog summary records served by the listing and meta endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub product_name_normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name_search: Option<String>,
    pub currency_code: Option<String>,
    pub availability_label: Option<String>,
    pub stock_status_label: Option<String>,
    pub latest_price: Option<f64>,
    pub previous_price: Option<f64>,
    pub first_price: Option<f64>,
    pub list_price_with_vat: Option<f64>,
    pub source_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub latest_scraped_at: Option<OffsetDateTime>,
    pub hero_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub short_description: Option<String>,
    pub supplementary_parameters: Value,
    pub metadata: Value,
    pub price_points: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_tags: Vec<String>,
}

/// Narrow projection used by type-ahead search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRow {
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub product_name_normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name_search: Option<String>,
    pub currency_code: Option<String>,
    pub availability_label: Option<String>,
    pub latest_price: Option<f64>,
    pub hero_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// One page of catalog rows plus the total matching the same filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub rows: Vec<CatalogRow>,
    pub total: i64,
}
