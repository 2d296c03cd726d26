//! Per-operation cache policy.
//!
//! Raw TTL settings come straight from configuration and may be unset, positive
//! or non-positive. [`CachePolicy::new`] folds them into one normalized value so
//! the read path never re-interprets configuration.

use std::time::Duration;

use serde::Deserialize;

use super::keys::Operation;

pub const DEFAULT_NAMESPACE: &str = "api-v1";

/// Longest TTL honored; larger configured values are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const DEFAULT_CATALOG_TTL_SECS: u64 = 120;
const DEFAULT_SUGGEST_TTL_SECS: u64 = 60;
const DEFAULT_PRODUCT_TTL_SECS: u64 = 300;
const DEFAULT_RECENT_TTL_SECS: u64 = 120;
const DEFAULT_CATEGORIES_TTL_SECS: u64 = 600;
const DEFAULT_PRICE_RANGE_TTL_SECS: u64 = 180;

/// TTL settings in seconds, as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TtlSettings {
    pub catalog: Option<i64>,
    pub suggest: Option<i64>,
    pub product: Option<i64>,
    pub recent: Option<i64>,
    pub categories: Option<i64>,
    pub price_range: Option<i64>,
}

impl TtlSettings {
    pub fn get(&self, operation: Operation) -> Option<i64> {
        match operation {
            Operation::Catalog => self.catalog,
            Operation::Suggest => self.suggest,
            Operation::Product => self.product,
            Operation::Recent => self.recent,
            Operation::Categories => self.categories,
            Operation::PriceRange => self.price_range,
        }
    }
}

fn default_ttl(operation: Operation) -> Duration {
    let secs = match operation {
        Operation::Catalog => DEFAULT_CATALOG_TTL_SECS,
        Operation::Suggest => DEFAULT_SUGGEST_TTL_SECS,
        Operation::Product => DEFAULT_PRODUCT_TTL_SECS,
        Operation::Recent => DEFAULT_RECENT_TTL_SECS,
        Operation::Categories => DEFAULT_CATEGORIES_TTL_SECS,
        Operation::PriceRange => DEFAULT_PRICE_RANGE_TTL_SECS,
    };
    Duration::from_secs(secs)
}

/// Normalized cache policy: a namespace and one optional TTL per operation.
///
/// A `None` TTL means caching is disabled for that operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    namespace: Option<String>,
    ttls: [Option<Duration>; Operation::COUNT],
}

impl CachePolicy {
    /// Unset TTLs take the built-in default, non-positive ones disable caching
    /// and positive ones are capped at [`MAX_TTL`].
    /// An unset namespace takes [`DEFAULT_NAMESPACE`], a blank one means none.
    pub fn new(namespace: Option<&str>, ttls: &TtlSettings) -> Self {
        let namespace = match namespace.map(str::trim) {
            None => Some(DEFAULT_NAMESPACE.to_string()),
            Some("") => None,
            Some(value) => Some(value.to_string()),
        };

        let mut normalized = [None; Operation::COUNT];
        for operation in Operation::ALL {
            normalized[operation as usize] = match ttls.get(operation) {
                None => Some(default_ttl(operation)),
                Some(secs) if secs > 0 => {
                    Some(Duration::from_secs(secs.unsigned_abs()).min(MAX_TTL))
                }
                Some(_) => None,
            };
        }

        Self {
            namespace,
            ttls: normalized,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn ttl(&self, operation: Operation) -> Option<Duration> {
        self.ttls[operation as usize]
    }

    pub fn is_enabled(&self, operation: Operation) -> bool {
        self.ttl(operation).is_some()
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(None, &TtlSettings::default())
    }
}
