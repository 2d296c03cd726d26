//! Price snapshot history records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Upper bound accepted for the product history window.
pub const MAX_HISTORY_POINTS: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: i64,
    pub product_code: Option<String>,
    pub product_name_original: Option<String>,
    pub product_name_normalized: Option<String>,
    pub price_with_vat: Option<f64>,
    pub list_price_with_vat: Option<f64>,
    pub currency_code: Option<String>,
    pub source_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scraped_at: OffsetDateTime,
    pub availability_label: Option<String>,
    pub stock_status_label: Option<String>,
    pub hero_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub short_description: Option<String>,
    pub supplementary_parameters: Value,
    pub metadata: Value,
    pub seller: Option<String>,
}

/// Window over a product's snapshot history.
///
/// `None` returns the full history; `Some(n)` keeps the newest `n` points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HistoryWindow(Option<u32>);

impl HistoryWindow {
    pub const FULL: Self = Self(None);

    /// Build a window from a requested point count; zero means full history.
    pub fn points(requested: u32) -> Self {
        match requested {
            0 => Self(None),
            n => Self(Some(n.min(MAX_HISTORY_POINTS))),
        }
    }

    pub fn limit(self) -> Option<u32> {
        self.0
    }
}
