use std::sync::Arc;

use crate::application::catalog::CatalogService;
use crate::config::ApiTimeouts;

#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<CatalogService>,
    pub timeouts: ApiTimeouts,
}

impl ApiState {
    pub fn new(catalog: Arc<CatalogService>, timeouts: ApiTimeouts) -> Self {
        Self { catalog, timeouts }
    }
}
