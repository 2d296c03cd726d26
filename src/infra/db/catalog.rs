use async_trait::async_trait;
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::application::repos::{CatalogRepo, RepoError};
use crate::domain::catalog::{CatalogPage, CatalogRow, CategoryCount, PriceRange, SuggestionRow};
use crate::domain::filters::{Availability, CatalogFilters, PriceRangeFilters};

use super::PostgresRepositories;
use super::predicate::{BindValue, Predicate, PredicateInput};
use super::util::map_sqlx_error;

const CATALOG_COLUMNS: &str = "\
    product_code, \
    product_name, \
    product_name_normalized, \
    product_name_search, \
    currency_code, \
    availability_label, \
    stock_status_label, \
    latest_price::double precision AS latest_price, \
    previous_price::double precision AS previous_price, \
    first_price::double precision AS first_price, \
    list_price_with_vat::double precision AS list_price_with_vat, \
    source_url, \
    latest_scraped_at, \
    hero_image_url, \
    COALESCE(gallery_image_urls, '{}'::text[]) AS gallery_image_urls, \
    short_description, \
    COALESCE(supplementary_parameters, '[]'::jsonb) AS supplementary_parameters, \
    COALESCE(metadata, '{}'::jsonb) AS metadata, \
    COALESCE(price_points, '[]'::jsonb) AS price_points, \
    COALESCE(category_tags, '{}'::text[]) AS category_tags";

const SUGGESTION_COLUMNS: &str = "\
    product_code, \
    product_name, \
    product_name_normalized, \
    product_name_search, \
    currency_code, \
    availability_label, \
    latest_price::double precision AS latest_price, \
    hero_image_url, \
    COALESCE(gallery_image_urls, '{}'::text[]) AS gallery_image_urls, \
    COALESCE(category_tags, '{}'::text[]) AS category_tags";

#[derive(FromRow)]
struct CatalogRecordRow {
    product_code: Option<String>,
    product_name: Option<String>,
    product_name_normalized: Option<String>,
    product_name_search: Option<String>,
    currency_code: Option<String>,
    availability_label: Option<String>,
    stock_status_label: Option<String>,
    latest_price: Option<f64>,
    previous_price: Option<f64>,
    first_price: Option<f64>,
    list_price_with_vat: Option<f64>,
    source_url: Option<String>,
    latest_scraped_at: Option<OffsetDateTime>,
    hero_image_url: Option<String>,
    gallery_image_urls: Vec<String>,
    short_description: Option<String>,
    supplementary_parameters: Value,
    metadata: Value,
    price_points: Value,
    category_tags: Vec<String>,
}

impl From<CatalogRecordRow> for CatalogRow {
    fn from(row: CatalogRecordRow) -> Self {
        Self {
            product_code: row.product_code,
            product_name: row.product_name,
            product_name_normalized: row.product_name_normalized,
            product_name_search: row.product_name_search,
            currency_code: row.currency_code,
            availability_label: row.availability_label,
            stock_status_label: row.stock_status_label,
            latest_price: row.latest_price,
            previous_price: row.previous_price,
            first_price: row.first_price,
            list_price_with_vat: row.list_price_with_vat,
            source_url: row.source_url,
            latest_scraped_at: row.latest_scraped_at,
            hero_image_url: row.hero_image_url,
            gallery_image_urls: row.gallery_image_urls,
            short_description: row.short_description,
            supplementary_parameters: row.supplementary_parameters,
            metadata: row.metadata,
            price_points: row.price_points,
            category_tags: row.category_tags,
        }
    }
}

#[derive(FromRow)]
struct SuggestionRecordRow {
    product_code: Option<String>,
    product_name: Option<String>,
    product_name_normalized: Option<String>,
    product_name_search: Option<String>,
    currency_code: Option<String>,
    availability_label: Option<String>,
    latest_price: Option<f64>,
    hero_image_url: Option<String>,
    gallery_image_urls: Vec<String>,
    category_tags: Vec<String>,
}

impl From<SuggestionRecordRow> for SuggestionRow {
    fn from(row: SuggestionRecordRow) -> Self {
        Self {
            product_code: row.product_code,
            product_name: row.product_name,
            product_name_normalized: row.product_name_normalized,
            product_name_search: row.product_name_search,
            currency_code: row.currency_code,
            availability_label: row.availability_label,
            latest_price: row.latest_price,
            hero_image_url: row.hero_image_url,
            gallery_image_urls: row.gallery_image_urls,
            category_tags: row.category_tags,
        }
    }
}

#[derive(FromRow)]
struct CategoryCountRow {
    category: String,
    count: i64,
}

#[derive(FromRow)]
struct PriceRangeRow {
    min_price: Option<f64>,
    max_price: Option<f64>,
}

impl PostgresRepositories {
    fn page_query(&self, predicate: &Predicate) -> String {
        let limit = predicate.next_placeholder();
        format!(
            "SELECT {CATALOG_COLUMNS} FROM {relation}{clause} \
             ORDER BY product_name ASC LIMIT ${limit} OFFSET ${offset}",
            relation = self.catalog_relation(),
            clause = predicate.clause(),
            offset = limit + 1,
        )
    }

    fn count_query(&self, predicate: &Predicate) -> String {
        format!(
            "SELECT COUNT(*) FROM {relation}{clause}",
            relation = self.catalog_relation(),
            clause = predicate.clause(),
        )
    }

    fn suggestion_query(&self, predicate: &Predicate) -> String {
        format!(
            "SELECT {SUGGESTION_COLUMNS} FROM {relation}{clause} \
             ORDER BY product_name ASC LIMIT ${limit}",
            relation = self.catalog_relation(),
            clause = predicate.clause(),
            limit = predicate.next_placeholder(),
        )
    }

    fn category_counts_query(&self, predicate: &Predicate) -> String {
        format!(
            "SELECT tag AS category, COUNT(*)::bigint AS count \
             FROM (SELECT unnest(category_tags) AS tag FROM {relation}{clause}) expanded \
             GROUP BY tag \
             ORDER BY count DESC, category ASC",
            relation = self.catalog_relation(),
            clause = predicate.clause(),
        )
    }

    fn price_range_query(&self, predicate: &Predicate) -> String {
        format!(
            "SELECT MIN(latest_price)::double precision AS min_price, \
             MAX(latest_price)::double precision AS max_price \
             FROM {relation}{clause}",
            relation = self.catalog_relation(),
            clause = predicate.clause(),
        )
    }
}

#[async_trait]
impl CatalogRepo for PostgresRepositories {
    async fn fetch_page(&self, filters: &CatalogFilters) -> Result<CatalogPage, RepoError> {
        let predicate = Predicate::build(PredicateInput {
            availability: filters.availability,
            min_price: filters.min_price,
            max_price: filters.max_price,
            categories: Some(&filters.categories),
            query: &filters.query,
        });

        let page_sql = self.page_query(&predicate);
        let page_args = predicate.arguments(&[
            BindValue::Int(i64::from(filters.limit)),
            BindValue::Int(i64::from(filters.offset)),
        ])?;
        let rows = sqlx::query_as_with::<_, CatalogRecordRow, _>(&page_sql, page_args)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let count_sql = self.count_query(&predicate);
        let total: i64 = sqlx::query_scalar_with(&count_sql, predicate.arguments(&[])?)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(CatalogPage {
            rows: rows.into_iter().map(CatalogRow::from).collect(),
            total,
        })
    }

    async fn search(
        &self,
        query: &str,
        availability: Availability,
        limit: u32,
    ) -> Result<Vec<SuggestionRow>, RepoError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let predicate = Predicate::build(PredicateInput {
            availability,
            query,
            ..Default::default()
        });
        let sql = self.suggestion_query(&predicate);
        let args = predicate.arguments(&[BindValue::Int(i64::from(limit))])?;
        let rows = sqlx::query_as_with::<_, SuggestionRecordRow, _>(&sql, args)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SuggestionRow::from).collect())
    }

    async fn category_counts(
        &self,
        availability: Availability,
    ) -> Result<Vec<CategoryCount>, RepoError> {
        let predicate = Predicate::build(PredicateInput {
            availability,
            ..Default::default()
        });
        let sql = self.category_counts_query(&predicate);
        let rows = sqlx::query_as_with::<_, CategoryCountRow, _>(&sql, predicate.arguments(&[])?)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryCount {
                category: row.category,
                count: row.count,
            })
            .collect())
    }

    async fn price_range(&self, filters: &PriceRangeFilters) -> Result<PriceRange, RepoError> {
        let predicate = Predicate::build(PredicateInput {
            availability: filters.availability,
            categories: Some(&filters.categories),
            ..Default::default()
        });
        let sql = self.price_range_query(&predicate);
        let row = sqlx::query_as_with::<_, PriceRangeRow, _>(&sql, predicate.arguments(&[])?)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(PriceRange {
            min_price: row.min_price,
            max_price: row.max_price,
        })
    }
}
