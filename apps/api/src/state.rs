use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::leads::scoring::LeadScorer;
use crate::pagination::{Page, PageParams};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Pluggable lead scorer. Default: WeightedLeadScorer.
    pub lead_scorer: Arc<dyn LeadScorer>,
}

impl AppState {
    pub fn page(&self, params: &PageParams) -> Page {
        params.normalize(self.config.default_page_size)
    }
}
