use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::request_id;

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState, frontend_origin: &str) -> Router {
    let cors = match frontend_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            tracing::warn!(origin = %frontend_origin, "Invalid CORS origin, allowing any");
            CorsLayer::permissive()
        }
    };

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(request_id::request_span))
        .layer(middleware::from_fn(request_id::assign_request_id))
        .with_state(state)
}

/// API routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(handlers::recommend))
        .route("/search", post(handlers::search))
        .route("/interactions", post(handlers::record_interaction))
}
