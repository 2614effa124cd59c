//! API Routes
//!
//! Configures the Axum router for the admin endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    bulk_handler, entity_handler, event_handler, health_handler, invalidation_stats_handler,
    metrics_handler, patterns_handler, purge_all_handler, AppState,
};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Store reachability
/// - `GET /metrics` - Per-level counters and recommendations
/// - `GET /invalidation/stats` - Invalidation counters
/// - `POST /invalidate/event` - Dispatch a domain event
/// - `POST /invalidate/entity/:id` - Invalidate one entity
/// - `POST /invalidate/bulk` - Invalidate many entities
/// - `POST /invalidate/patterns` - Purge validated patterns
/// - `POST /invalidate/all` - Purge everything for this domain and tenant
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/invalidation/stats", get(invalidation_stats_handler))
        .route("/invalidate/event", post(event_handler))
        .route("/invalidate/entity/:id", post(entity_handler))
        .route("/invalidate/bulk", post(bulk_handler))
        .route("/invalidate/patterns", post(patterns_handler))
        .route("/invalidate/all", post(purge_all_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
