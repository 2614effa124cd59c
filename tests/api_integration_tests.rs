//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use catalog_cache::api::create_router;
use catalog_cache::{AppState, CacheManager, CacheStore, Invalidator, KeyGenerator, MemoryStore};

// == Helper Functions ==

fn create_test_app() -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new(100));
    let keys = KeyGenerator::default();
    let manager = CacheManager::new(store.clone(), keys.clone());
    let invalidator =
        Invalidator::new(store.clone(), keys).with_cache_stats(manager.stats().clone());
    let app = create_router(AppState::new(Arc::new(manager), Arc::new(invalidator)));
    (store, app)
}

async fn seed(store: &MemoryStore) {
    let keys = KeyGenerator::default();
    let ttl = Duration::from_secs(300);
    for id in [1, 2] {
        store
            .set(&keys.entity_key(id).to_string(), json!({"id": id}), ttl)
            .await
            .unwrap();
    }
    for query_type in ["list", "search"] {
        let key = keys.query_key(query_type, &json!({"page": 1})).to_string();
        store.set(&key, json!([1, 2]), ttl).await.unwrap();
    }
    let key = keys.aggregate_key("statistics", &json!({})).to_string();
    store.set(&key, json!({"total": 2}), ttl).await.unwrap();
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// == Health and Metrics ==

#[tokio::test]
async fn test_health_endpoint() {
    let (store, app) = create_test_app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["store_available"], true);

    store.set_available(false);
    let response = app.oneshot(get("/health")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_, app) = create_test_app();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    for level in ["entity", "query", "aggregate", "service"] {
        assert!(json["levels"].get(level).is_some(), "missing level {}", level);
    }
    assert_eq!(json["overall_hit_rate"], 0.0);
}

// == Event Invalidation ==

#[tokio::test]
async fn test_event_endpoint() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/invalidate/event",
            json!({"event": "product.updated", "context": {"productId": 1}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["handled"], true);
    assert_eq!(json["entities_invalidated"], 1);
    assert_eq!(json["queries"]["deleted"], 2);
    // entity 2 and the statistics aggregate survive
    assert_eq!(store.len().await, 2);

    let response = app.oneshot(get("/invalidation/stats")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["events_processed"], 1);
    assert_eq!(json["last_invalidation"]["kind"], "event");
}

#[tokio::test]
async fn test_unknown_event_is_reported_not_failed() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .oneshot(post_json("/invalidate/event", json!({"event": "product.melted"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["handled"], false);
    assert_eq!(store.len().await, 5);
}

#[tokio::test]
async fn test_event_endpoint_malformed_json() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/invalidate/event")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

// == Entity and Bulk ==

#[tokio::test]
async fn test_entity_endpoint_without_related() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/invalidate/entity/2?related=false")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["id"], "2");
    assert_eq!(json["success"], true);
    assert_eq!(json["related"], false);
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn test_bulk_endpoint() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .clone()
        .oneshot(post_json("/invalidate/bulk", json!({"ids": [1, "2"], "chunk_size": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["invalidated"], 2);
    assert_eq!(json["chunks"], 2);
    assert!(store.is_empty().await);

    let response = app
        .oneshot(post_json("/invalidate/bulk", json!({"ids": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// == Patterns and Full Purge ==

#[tokio::test]
async fn test_patterns_endpoint_dry_run_and_delete() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/invalidate/patterns",
            json!({"patterns": ["catalog:default:query:*"], "dry_run": true}),
        ))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["matched"], 2);
    assert_eq!(json["deleted"], 0);
    assert_eq!(store.len().await, 5);

    let response = app
        .oneshot(post_json(
            "/invalidate/patterns",
            json!({"patterns": ["catalog:default:query:*"]}),
        ))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["deleted"], 2);
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn test_patterns_endpoint_rejects_unscoped_pattern() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .oneshot(post_json("/invalidate/patterns", json!({"patterns": ["*"]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("Invalid pattern"));
    assert_eq!(store.len().await, 5);
}

#[tokio::test]
async fn test_purge_all_endpoint() {
    let (store, app) = create_test_app();
    seed(&store).await;

    let response = app
        .clone()
        .oneshot(post_json("/invalidate/all", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.len().await, 5);

    let response = app
        .oneshot(post_json("/invalidate/all", json!({"confirm": true})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["deleted"], 5);
    assert!(store.is_empty().await);
}
