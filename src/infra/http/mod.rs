//! HTTP surface: routing, query parsing, error mapping and request logging.

mod error;
mod handlers;
mod middleware;
mod query;
mod state;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{REQUEST_ID_HEADER, RequestId};
pub use state::ApiState;

use axum::{Router, middleware as axum_middleware, routing::get};

use self::middleware::{log_responses, set_request_id};

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/catalog", get(handlers::catalog))
        .route("/api/v1/search/suggest", get(handlers::search_suggest))
        .route("/api/v1/products/{slug}", get(handlers::product_snapshots))
        .route("/api/v1/snapshots/recent", get(handlers::recent_snapshots))
        .route("/api/v1/meta/categories", get(handlers::categories))
        .route("/api/v1/meta/price-range", get(handlers::price_range))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_id))
}
