use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::error::AppResult;
use crate::models::{Interaction, RawPreferences, Recommendation, SourceLabel};
use crate::services::Degraded;

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(flatten)]
    pub preferences: RawPreferences,
    #[serde(default)]
    pub use_ai_fetch: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub use_ai_fetch: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub user_id: String,
    pub restaurant_id: u32,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub clicked: bool,
    #[serde(default)]
    pub viewed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub restaurant_name: String,
    pub food_suggestion: String,
    pub reason_for_recommendation: String,
    pub location: String,
    pub address: String,
    pub contact_details: Option<String>,
    pub score: f64,
    pub sources: BTreeSet<SourceLabel>,
}

impl From<&Recommendation> for RecommendationItem {
    fn from(rec: &Recommendation) -> Self {
        let food_suggestion = rec
            .restaurant
            .popular_dishes
            .first()
            .cloned()
            .unwrap_or_else(|| "Chef's Special".to_string());
        Self {
            restaurant_name: rec.restaurant.name.clone(),
            food_suggestion,
            reason_for_recommendation: rec.rationale.clone(),
            location: rec.restaurant.location.clone(),
            address: rec.restaurant.address.clone(),
            contact_details: rec.restaurant.contact_details.clone(),
            score: rec.score,
            sources: rec.sources.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationItem>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Degraded<Vec<Recommendation>>> for RecommendationResponse {
    fn from(outcome: Degraded<Vec<Recommendation>>) -> Self {
        let recommendations: Vec<RecommendationItem> =
            outcome.value.iter().map(RecommendationItem::from).collect();
        let message = if recommendations.is_empty() && outcome.message.is_none() {
            Some(
                "No restaurants matched your preferences. Try broadening your search.".to_string(),
            )
        } else {
            outcome.message
        };
        Self {
            recommendations,
            degraded: outcome.degraded,
            message,
        }
    }
}

// Handlers

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "restaurants": state.engine.pool_size(),
        "generativeEnabled": state.engine.generative_enabled(),
    }))
}

/// Full recommendation pipeline from structured preferences
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let outcome = state
        .engine
        .recommend(request.preferences, request.use_ai_fetch)
        .await?;
    Ok(Json(outcome.into()))
}

/// Free-text entry point: unrecognized fields fall back to defaults and
/// the query itself drives extraction inside the engine
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let preferences = RawPreferences {
        mood: "happy".to_string(),
        occasion: "casual meal".to_string(),
        cuisine: "any".to_string(),
        dietary_preference: "non-vegetarian".to_string(),
        time: "dinner".to_string(),
        location: String::new(),
        additional_notes: None,
        user_id: request.user_id,
        search_query: Some(request.query),
    };
    let outcome = state
        .engine
        .recommend(preferences, request.use_ai_fetch)
        .await?;
    Ok(Json(outcome.into()))
}

/// Appends one interaction to the durable log
pub async fn record_interaction(
    State(state): State<AppState>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let interaction = Interaction::new(
        request.user_id,
        request.restaurant_id,
        request.rating,
        request.clicked,
        request.viewed,
    );
    state.interactions.append(interaction).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "recorded" }))))
}
