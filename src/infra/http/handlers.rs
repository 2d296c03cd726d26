//! Route handlers for the read-only catalog API.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

use crate::application::context::{CancelOnDrop, RequestContext};
use crate::domain::catalog::{CatalogRow, SuggestionRow};

use super::error::ApiError;
use super::query::{
    AvailabilityQuery, CatalogQuery, PriceRangeQuery, ProductQuery, RecentQuery, SuggestQuery,
};
use super::state::ApiState;

#[derive(Debug, Serialize)]
struct CatalogResponse {
    rows: Vec<CatalogRow>,
    total: i64,
    total_estimate: i64,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Serialize)]
struct RowsResponse<T> {
    rows: Vec<T>,
}

/// Context for one request. The guard cancels it if the handler future is
/// dropped before completion.
fn request_context(timeout: Duration) -> (RequestContext, CancelOnDrop) {
    let (ctx, handle) = RequestContext::with_timeout(timeout).cancellable();
    (ctx, handle.cancel_on_drop())
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn catalog(
    State(state): State<ApiState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, _guard) = request_context(state.timeouts.catalog);
    let filters = query.into_filters(state.catalog.max_page_size());
    let (limit, offset) = (filters.limit, filters.offset);

    let page = state.catalog.catalog(&ctx, filters).await?;

    Ok(Json(CatalogResponse {
        rows: page.rows,
        total: page.total,
        total_estimate: page.total,
        limit,
        offset,
    }))
}

pub async fn search_suggest(
    State(state): State<ApiState>,
    Query(query): Query<SuggestQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.into_params(state.catalog.max_page_size());
    let Some(text) = params.query else {
        return Ok(Json(RowsResponse {
            rows: Vec::<SuggestionRow>::new(),
        }));
    };

    let (ctx, _guard) = request_context(state.timeouts.search);
    let rows = state
        .catalog
        .suggest(&ctx, &text, params.availability, params.limit)
        .await?;
    Ok(Json(RowsResponse { rows }))
}

pub async fn product_snapshots(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = slug.trim();
    if slug.is_empty() {
        return Err(ApiError::validation("slug is required", None));
    }

    let (ctx, _guard) = request_context(state.timeouts.product);
    let rows = state
        .catalog
        .product_snapshots(&ctx, slug, query.window())
        .await?;
    Ok(Json(RowsResponse { rows }))
}

pub async fn recent_snapshots(
    State(state): State<ApiState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, _guard) = request_context(state.timeouts.recent);
    let rows = state.catalog.recent_snapshots(&ctx, query.limit()).await?;
    Ok(Json(RowsResponse { rows }))
}

pub async fn categories(
    State(state): State<ApiState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, _guard) = request_context(state.timeouts.categories);
    let rows = state
        .catalog
        .category_counts(&ctx, query.availability())
        .await?;
    Ok(Json(RowsResponse { rows }))
}

pub async fn price_range(
    State(state): State<ApiState>,
    Query(query): Query<PriceRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, _guard) = request_context(state.timeouts.price_range);
    let range = state
        .catalog
        .price_range(&ctx, query.into_filters())
        .await?;
    Ok(Json(range))
}
