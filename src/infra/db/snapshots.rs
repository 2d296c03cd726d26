use async_trait::async_trait;
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::application::repos::{RepoError, SnapshotRepo};
use crate::domain::snapshots::{HistoryWindow, SnapshotRow};

use super::{PostgresRepositories, map_sqlx_error};

const SNAPSHOT_COLUMNS: &str = "\
    id, \
    product_code, \
    product_name_original, \
    product_name_normalized, \
    price_with_vat::double precision AS price_with_vat, \
    list_price_with_vat::double precision AS list_price_with_vat, \
    currency_code, \
    source_url, \
    scraped_at, \
    availability_label, \
    stock_status_label, \
    hero_image_url, \
    COALESCE(gallery_image_urls, '{}'::text[]) AS gallery_image_urls, \
    short_description, \
    COALESCE(supplementary_parameters, '[]'::jsonb) AS supplementary_parameters, \
    COALESCE(metadata, '{}'::jsonb) AS metadata, \
    seller";

#[derive(FromRow)]
struct SnapshotRecordRow {
    id: i64,
    product_code: Option<String>,
    product_name_original: Option<String>,
    product_name_normalized: Option<String>,
    price_with_vat: Option<f64>,
    list_price_with_vat: Option<f64>,
    currency_code: Option<String>,
    source_url: Option<String>,
    scraped_at: OffsetDateTime,
    availability_label: Option<String>,
    stock_status_label: Option<String>,
    hero_image_url: Option<String>,
    gallery_image_urls: Vec<String>,
    short_description: Option<String>,
    supplementary_parameters: Value,
    metadata: Value,
    seller: Option<String>,
}

impl From<SnapshotRecordRow> for SnapshotRow {
    fn from(row: SnapshotRecordRow) -> Self {
        Self {
            id: row.id,
            product_code: row.product_code,
            product_name_original: row.product_name_original,
            product_name_normalized: row.product_name_normalized,
            price_with_vat: row.price_with_vat,
            list_price_with_vat: row.list_price_with_vat,
            currency_code: row.currency_code,
            source_url: row.source_url,
            scraped_at: row.scraped_at,
            availability_label: row.availability_label,
            stock_status_label: row.stock_status_label,
            hero_image_url: row.hero_image_url,
            gallery_image_urls: row.gallery_image_urls,
            short_description: row.short_description,
            supplementary_parameters: row.supplementary_parameters,
            metadata: row.metadata,
            seller: row.seller,
        }
    }
}

impl PostgresRepositories {
    fn history_query(&self, window: HistoryWindow) -> String {
        let relation = self.snapshot_relation();
        match window.limit() {
            None => format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM {relation} \
                 WHERE product_name_normalized = $1 \
                 ORDER BY scraped_at ASC"
            ),
            // Newest N points, handed back oldest first.
            Some(_) => format!(
                "SELECT * FROM (\
                 SELECT {SNAPSHOT_COLUMNS} FROM {relation} \
                 WHERE product_name_normalized = $1 \
                 ORDER BY scraped_at DESC LIMIT $2\
                 ) newest ORDER BY scraped_at ASC"
            ),
        }
    }

    fn recent_query(&self) -> String {
        format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM {relation} ORDER BY scraped_at DESC LIMIT $1",
            relation = self.snapshot_relation(),
        )
    }
}

#[async_trait]
impl SnapshotRepo for PostgresRepositories {
    async fn by_slug(
        &self,
        slug: &str,
        window: HistoryWindow,
    ) -> Result<Vec<SnapshotRow>, RepoError> {
        let sql = self.history_query(window);
        let mut query = sqlx::query_as::<_, SnapshotRecordRow>(&sql).bind(slug);
        if let Some(points) = window.limit() {
            query = query.bind(i64::from(points));
        }
        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SnapshotRow::from).collect())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SnapshotRow>, RepoError> {
        let sql = self.recent_query();
        let rows = sqlx::query_as::<_, SnapshotRecordRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SnapshotRow::from).collect())
    }
}
