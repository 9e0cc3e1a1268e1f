use std::sync::Arc;

use crate::db::InteractionLog;
use crate::services::RecommendationEngine;

/// Shared application state, constructed once in `main` and injected
/// into handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub interactions: Arc<InteractionLog>,
}

impl AppState {
    pub fn new(engine: Arc<RecommendationEngine>, interactions: Arc<InteractionLog>) -> Self {
        Self {
            engine,
            interactions,
        }
    }
}
