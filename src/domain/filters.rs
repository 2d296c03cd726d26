//! Structured filter descriptions shared by cache keys and query predicates.

use std::collections::BTreeSet;
use std::fmt;

/// Availability facet of the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Availability {
    #[default]
    Any,
    Available,
    Preorder,
}

impl Availability {
    /// Parse a raw availability value; blank or unknown values mean `Any`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "available" => Self::Available,
            "preorder" => Self::Preorder,
            _ => Self::Any,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Available => "available",
            Self::Preorder => "preorder",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplicated, order-independent set of category labels.
///
/// Labels are trimmed and blank labels dropped. Case is preserved because
/// category tags are matched case-sensitively by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CategorySet(BTreeSet<String>);

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a comma separated list into a category set.
    pub fn parse_list(raw: &str) -> Self {
        raw.split(',').collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Labels in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CategorySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let labels = iter
            .into_iter()
            .filter_map(|label| {
                let trimmed = label.as_ref().trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();
        Self(labels)
    }
}

/// Filter description for catalog listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilters {
    pub availability: Availability,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub categories: CategorySet,
    pub query: String,
    pub limit: u32,
    pub offset: u32,
}

impl CatalogFilters {
    /// Clamp the page window so that `1 <= limit <= max_page_size`.
    pub fn bounded(mut self, max_page_size: u32) -> Self {
        let max = max_page_size.max(1);
        self.limit = self.limit.clamp(1, max);
        self
    }
}

/// Filters accepted by the price range aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceRangeFilters {
    pub availability: Availability,
    pub categories: CategorySet,
}

/// Normalize free text for substring matching.
///
/// Lower-cases, strips characters that carry wildcard meaning in `ILIKE`
/// patterns (and the list separators the UI sends), and collapses runs of
/// whitespace into a single space.
pub fn normalize_search_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| match ch {
            ',' | '*' | '%' | '_' | '\\' => ' ',
            other => other,
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
