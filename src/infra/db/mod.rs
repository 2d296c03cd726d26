//! Postgres-backed repository implementations.

mod catalog;
pub mod predicate;
mod snapshots;
mod util;

pub use predicate::{BindValue, Predicate, PredicateInput, RelationName};
pub use util::map_sqlx_error;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
    query,
};

pub const DEFAULT_CATALOG_RELATION: &str = "public.catalog_slug_summary";
pub const DEFAULT_SNAPSHOT_RELATION: &str = "public.product_price_snapshots";

/// Relation names as configured; validated by [`PostgresRepositories::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSettings {
    pub catalog: String,
    pub snapshots: String,
}

impl Default for RelationSettings {
    fn default() -> Self {
        Self {
            catalog: DEFAULT_CATALOG_RELATION.to_string(),
            snapshots: DEFAULT_SNAPSHOT_RELATION.to_string(),
        }
    }
}

/// Connection pool sizing and lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Disable prepared statement caching for transaction-pooling proxies.
    pub statement_cache: bool,
}

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    catalog_relation: RelationName,
    snapshot_relation: RelationName,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool, relations: &RelationSettings) -> Self {
        Self {
            pool: Arc::new(pool),
            catalog_relation: RelationName::parse(&relations.catalog, DEFAULT_CATALOG_RELATION),
            snapshot_relation: RelationName::parse(&relations.snapshots, DEFAULT_SNAPSHOT_RELATION),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn catalog_relation(&self) -> &RelationName {
        &self.catalog_relation
    }

    pub fn snapshot_relation(&self) -> &RelationName {
        &self.snapshot_relation
    }

    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
        let mut options = PgConnectOptions::from_str(url)?;
        if !settings.statement_cache {
            options = options.statement_cache_capacity(0);
        }

        let max_connections = settings.max_connections.max(1);
        PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(settings.min_connections.min(max_connections))
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .max_lifetime(Some(settings.max_lifetime))
            .connect_with(options)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
