//! API Handlers
//!
//! Admin endpoints over the cache manager and the invalidator.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::CacheStore;
use crate::error::{CacheError, Result};
use crate::invalidation::{BulkReport, EventReport, InvalidationStats, Invalidator, PurgeReport};
use crate::manager::{CacheManager, CacheMetrics};
use crate::models::{
    BulkInvalidationRequest, EntityInvalidationParams, EntityInvalidationResponse,
    EventInvalidationRequest, HealthResponse, PatternInvalidationRequest, PurgeAllRequest,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CacheManager>,
    pub invalidator: Arc<Invalidator>,
}

impl AppState {
    pub fn new(manager: Arc<CacheManager>, invalidator: Arc<Invalidator>) -> Self {
        Self {
            manager,
            invalidator,
        }
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let available = state.manager.store().is_available().await;
    Json(HealthResponse::from_store(available))
}

/// Handler for GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<CacheMetrics> {
    Json(state.manager.get_cache_metrics().await)
}

/// Handler for GET /invalidation/stats
pub async fn invalidation_stats_handler(State(state): State<AppState>) -> Json<InvalidationStats> {
    Json(state.invalidator.get_invalidation_stats())
}

/// Handler for POST /invalidate/event
///
/// Unknown events are not an error: the report comes back with `handled: false`.
pub async fn event_handler(
    State(state): State<AppState>,
    Json(req): Json<EventInvalidationRequest>,
) -> Result<Json<EventReport>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let report = state
        .invalidator
        .invalidate_by_event(req.event.trim(), &req.context)
        .await;
    Ok(Json(report))
}

/// Handler for POST /invalidate/entity/:id
pub async fn entity_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<EntityInvalidationParams>,
) -> Json<EntityInvalidationResponse> {
    let options = params.options();
    let success = state.invalidator.invalidate_entity(&id, options).await;

    Json(EntityInvalidationResponse {
        id,
        success,
        related: options.invalidate_related,
    })
}

/// Handler for POST /invalidate/bulk
pub async fn bulk_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkInvalidationRequest>,
) -> Result<Json<BulkReport>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let options = req.options();
    Ok(Json(state.invalidator.bulk_invalidate(req.ids, options).await))
}

/// Handler for POST /invalidate/patterns
///
/// Any pattern that fails validation rejects the whole request with 400.
pub async fn patterns_handler(
    State(state): State<AppState>,
    Json(req): Json<PatternInvalidationRequest>,
) -> Result<Json<PurgeReport>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let report = state
        .invalidator
        .invalidate_query_cache(&req.patterns, req.options())
        .await?;
    Ok(Json(report))
}

/// Handler for POST /invalidate/all
pub async fn purge_all_handler(
    State(state): State<AppState>,
    Json(req): Json<PurgeAllRequest>,
) -> Result<Json<PurgeReport>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    info!(dry_run = req.dry_run, "Full purge requested over HTTP");
    Ok(Json(state.invalidator.invalidate_all(req.options()).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::invalidation::InvalidationContext;
    use crate::keys::KeyGenerator;
    use serde_json::json;
    use std::time::Duration;

    fn test_state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new(100));
        let keys = KeyGenerator::default();
        let manager = CacheManager::new(store.clone(), keys.clone());
        let invalidator = Invalidator::new(store.clone(), keys)
            .with_cache_stats(manager.stats().clone());
        (store, AppState::new(Arc::new(manager), Arc::new(invalidator)))
    }

    #[tokio::test]
    async fn test_health_handler_reports_degraded_store() {
        let (store, state) = test_state();

        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status, "healthy");

        store.set_available(false);
        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "degraded");
    }

    #[tokio::test]
    async fn test_entity_handler_deletes_key() {
        let (store, state) = test_state();
        let key = state.manager.keys().entity_key("5").to_string();
        store.set(&key, json!({"id": 5}), Duration::from_secs(60)).await.unwrap();

        let response = entity_handler(
            State(state.clone()),
            Path("5".to_string()),
            Query(EntityInvalidationParams::default()),
        )
        .await;
        assert!(response.success);
        assert!(response.related);
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_handler_rejects_blank_event() {
        let (_, state) = test_state();
        let req = EventInvalidationRequest {
            event: "".to_string(),
            context: InvalidationContext::default(),
        };
        let result = event_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_patterns_handler_rejects_unscoped_pattern() {
        let (_, state) = test_state();
        let req = PatternInvalidationRequest {
            patterns: vec!["*".to_string()],
            dry_run: false,
            max_keys: None,
        };
        let result = patterns_handler(State(state.clone()), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));
        assert_eq!(
            invalidation_stats_handler(State(state)).await.rejected_patterns,
            1
        );
    }

    #[tokio::test]
    async fn test_purge_all_requires_confirm() {
        let (_, state) = test_state();
        let result = purge_all_handler(State(state), Json(PurgeAllRequest::default())).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_metrics_handler_lists_every_level() {
        let (_, state) = test_state();
        let response = metrics_handler(State(state)).await;
        assert_eq!(response.levels.len(), 4);
        assert!(response.store_available);
    }
}
