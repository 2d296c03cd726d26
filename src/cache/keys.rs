//! Cache key definitions.
//!
//! Every key starts with its operation tag, followed by `field=value` parts
//! joined with `;`. Free-form values are length-prefixed (`len:value`) so a
//! delimiter inside a value can never make two descriptions collide, and an
//! absent numeric bound renders as `none`, which no formatted number matches.

use std::fmt;

use crate::domain::filters::{
    Availability, CatalogFilters, CategorySet, PriceRangeFilters, normalize_search_text,
};
use crate::domain::snapshots::HistoryWindow;

const ABSENT: &str = "none";
const BOUND_PRECISION: usize = 4;

/// Logical read operations served through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Catalog,
    Suggest,
    Product,
    Recent,
    Categories,
    PriceRange,
}

impl Operation {
    pub const COUNT: usize = 6;

    pub const ALL: [Operation; Self::COUNT] = [
        Operation::Catalog,
        Operation::Suggest,
        Operation::Product,
        Operation::Recent,
        Operation::Categories,
        Operation::PriceRange,
    ];

    /// Key prefix and metric label for the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Catalog => "catalog",
            Operation::Suggest => "suggest",
            Operation::Product => "product",
            Operation::Recent => "recent",
            Operation::Categories => "categories",
            Operation::PriceRange => "price-range",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key of one logical query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: Operation,
    key: String,
}

impl CacheKey {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn catalog(filters: &CatalogFilters) -> Self {
        KeyBuilder::new(Operation::Catalog)
            .availability(filters.availability)
            .bound("min", filters.min_price)
            .bound("max", filters.max_price)
            .text("q", &normalize_search_text(&filters.query))
            .categories(&filters.categories)
            .number("limit", filters.limit)
            .number("offset", filters.offset)
            .finish()
    }

    pub fn suggest(query: &str, availability: Availability, limit: u32) -> Self {
        KeyBuilder::new(Operation::Suggest)
            .text("q", &normalize_search_text(query))
            .availability(availability)
            .number("limit", limit)
            .finish()
    }

    pub fn product(slug: &str, window: HistoryWindow) -> Self {
        let points = window.limit().unwrap_or(0);
        KeyBuilder::new(Operation::Product)
            .text("slug", &slug.trim().to_lowercase())
            .number("points", points)
            .finish()
    }

    pub fn recent(limit: u32) -> Self {
        KeyBuilder::new(Operation::Recent)
            .number("limit", limit)
            .finish()
    }

    pub fn categories(availability: Availability) -> Self {
        KeyBuilder::new(Operation::Categories)
            .availability(availability)
            .finish()
    }

    pub fn price_range(filters: &PriceRangeFilters) -> Self {
        KeyBuilder::new(Operation::PriceRange)
            .availability(filters.availability)
            .categories(&filters.categories)
            .finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

struct KeyBuilder {
    operation: Operation,
    key: String,
    first: bool,
}

impl KeyBuilder {
    fn new(operation: Operation) -> Self {
        let mut key = String::with_capacity(96);
        key.push_str(operation.as_str());
        key.push(':');
        Self {
            operation,
            key,
            first: true,
        }
    }

    fn field(&mut self, tag: &str) {
        if !self.first {
            self.key.push(';');
        }
        self.first = false;
        self.key.push_str(tag);
        self.key.push('=');
    }

    fn push_framed(&mut self, value: &str) {
        // Length in bytes, so the reader always knows where the value ends.
        self.key.push_str(&format!("{}:{}", value.len(), value));
    }

    fn availability(mut self, availability: Availability) -> Self {
        self.field("avail");
        self.key.push_str(availability.as_str());
        self
    }

    fn bound(mut self, tag: &str, value: Option<f64>) -> Self {
        self.field(tag);
        match value {
            Some(value) => {
                self.key.push_str(&format!("{:.*}", BOUND_PRECISION, value));
            }
            None => self.key.push_str(ABSENT),
        }
        self
    }

    fn text(mut self, tag: &str, value: &str) -> Self {
        self.field(tag);
        self.push_framed(value);
        self
    }

    fn categories(mut self, categories: &CategorySet) -> Self {
        self.field("cats");
        self.key.push_str(&format!("{}[", categories.len()));
        for (index, label) in categories.iter().enumerate() {
            if index > 0 {
                self.key.push(',');
            }
            self.push_framed(label);
        }
        self.key.push(']');
        self
    }

    fn number(mut self, tag: &str, value: u32) -> Self {
        self.field(tag);
        self.key.push_str(&value.to_string());
        self
    }

    fn finish(self) -> CacheKey {
        CacheKey {
            operation: self.operation,
            key: self.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn filters(availability: &str, categories: &[&str]) -> CatalogFilters {
        CatalogFilters {
            availability: Availability::parse(availability),
            categories: categories.iter().collect(),
            limit: 20,
            ..Default::default()
        }
    }

    #[test]
    fn equal_descriptions_share_a_key() {
        let left = filters("available", &["b", "a"]);
        let right = filters("AVAILABLE ", &["a", "b"]);
        assert_eq!(CacheKey::catalog(&left), CacheKey::catalog(&right));
    }

    #[test]
    fn query_case_and_whitespace_do_not_fragment_keys() {
        let left = CatalogFilters {
            query: "  Twilight Imperium ".to_string(),
            ..Default::default()
        };
        let right = CatalogFilters {
            query: "twilight   imperium".to_string(),
            ..Default::default()
        };
        assert_eq!(CacheKey::catalog(&left), CacheKey::catalog(&right));
    }

    #[test]
    fn bounds_use_fixed_precision() {
        let left = CatalogFilters {
            min_price: Some(0.1 + 0.2),
            ..Default::default()
        };
        let right = CatalogFilters {
            min_price: Some(0.3),
            ..Default::default()
        };
        assert_eq!(CacheKey::catalog(&left), CacheKey::catalog(&right));
        assert!(CacheKey::catalog(&right).as_str().contains("min=0.3000"));
        assert!(
            CacheKey::catalog(&CatalogFilters::default())
                .as_str()
                .contains("min=none;max=none")
        );
    }

    #[test]
    fn delimiters_inside_values_do_not_collide() {
        let joined = CatalogFilters {
            categories: ["a,b"].into_iter().collect(),
            ..Default::default()
        };
        let split = CatalogFilters {
            categories: ["a", "b"].into_iter().collect(),
            ..Default::default()
        };
        assert_ne!(CacheKey::catalog(&joined), CacheKey::catalog(&split));

        let query_with_tag = CatalogFilters {
            query: "x;cats=0[]".to_string(),
            ..Default::default()
        };
        let plain = CatalogFilters {
            query: "x".to_string(),
            ..Default::default()
        };
        assert_ne!(CacheKey::catalog(&query_with_tag), CacheKey::catalog(&plain));
    }

    #[test]
    fn distinct_descriptions_produce_distinct_keys() {
        let variants = vec![
            CatalogFilters::default(),
            CatalogFilters {
                availability: Availability::Available,
                ..Default::default()
            },
            CatalogFilters {
                availability: Availability::Preorder,
                ..Default::default()
            },
            CatalogFilters {
                min_price: Some(10.0),
                ..Default::default()
            },
            CatalogFilters {
                max_price: Some(10.0),
                ..Default::default()
            },
            CatalogFilters {
                min_price: Some(0.0),
                ..Default::default()
            },
            CatalogFilters {
                categories: ["family"].into_iter().collect(),
                ..Default::default()
            },
            CatalogFilters {
                query: "none".to_string(),
                ..Default::default()
            },
            CatalogFilters {
                limit: 40,
                ..Default::default()
            },
            CatalogFilters {
                offset: 40,
                ..Default::default()
            },
        ];
        let keys: HashSet<_> = variants.iter().map(CacheKey::catalog).collect();
        assert_eq!(keys.len(), variants.len());
    }

    #[test]
    fn operations_never_share_keys() {
        let keys: HashSet<String> = [
            CacheKey::catalog(&CatalogFilters::default()),
            CacheKey::suggest("", Availability::Any, 0),
            CacheKey::product("", HistoryWindow::FULL),
            CacheKey::recent(0),
            CacheKey::categories(Availability::Any),
            CacheKey::price_range(&PriceRangeFilters::default()),
        ]
        .iter()
        .map(|key| key.as_str().to_string())
        .collect();
        assert_eq!(keys.len(), Operation::ALL.len());
        assert!(keys.iter().any(|key| key.starts_with("price-range:")));
    }

    #[test]
    fn product_keys_normalize_slug_and_window() {
        assert_eq!(
            CacheKey::product(" Alpha-Game ", HistoryWindow::points(250)),
            CacheKey::product("alpha-game", HistoryWindow::points(250))
        );
        assert_ne!(
            CacheKey::product("alpha-game", HistoryWindow::FULL),
            CacheKey::product("alpha-game", HistoryWindow::points(250))
        );
    }

    #[test]
    fn price_range_key_ignores_category_order() {
        let left = PriceRangeFilters {
            availability: Availability::parse("available"),
            categories: CategorySet::parse_list("Strategy,Family"),
        };
        let right = PriceRangeFilters {
            availability: Availability::Available,
            categories: CategorySet::parse_list("Family,Strategy"),
        };
        assert_eq!(CacheKey::price_range(&left), CacheKey::price_range(&right));
        assert_eq!(CacheKey::recent(50).as_str(), "recent:limit=50");
    }
}
