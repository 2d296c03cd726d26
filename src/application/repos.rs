//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::catalog::{CatalogPage, CategoryCount, PriceRange, SuggestionRow};
use crate::domain::filters::{Availability, CatalogFilters, PriceRangeFilters};
use crate::domain::snapshots::{HistoryWindow, SnapshotRow};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read access to the catalog summary relation.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Rows matching `filters` within its page window, plus the total match count.
    async fn fetch_page(&self, filters: &CatalogFilters) -> Result<CatalogPage, RepoError>;

    /// Type-ahead lookup. A blank query yields no rows.
    async fn search(
        &self,
        query: &str,
        availability: Availability,
        limit: u32,
    ) -> Result<Vec<SuggestionRow>, RepoError>;

    async fn category_counts(
        &self,
        availability: Availability,
    ) -> Result<Vec<CategoryCount>, RepoError>;

    async fn price_range(&self, filters: &PriceRangeFilters) -> Result<PriceRange, RepoError>;
}

/// Read access to the price snapshot history.
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    /// Snapshot history for a normalized product identifier, oldest first.
    async fn by_slug(
        &self,
        slug: &str,
        window: HistoryWindow,
    ) -> Result<Vec<SnapshotRow>, RepoError>;

    /// Most recent snapshots across all products, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<SnapshotRow>, RepoError>;
}
