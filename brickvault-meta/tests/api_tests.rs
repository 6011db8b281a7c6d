//! HTTP surface tests driven through the router

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use brickvault_common::events::EventBus;
use brickvault_meta::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use helpers::*;
use std::sync::Arc;
use tower::ServiceExt;

fn catalog() -> StubCatalog {
    StubCatalog::new()
        .with_part("3001", "Brick 2 x 4", &[("4", "Red"), ("1", "Blue")])
        .with_minifig("fig-000001", "Luke Skywalker (Tatooine)")
}

async fn test_app() -> (Router, Arc<StubCatalog>) {
    test_app_with(catalog()).await
}

async fn test_app_with(catalog: StubCatalog) -> (Router, Arc<StubCatalog>) {
    let pool = memory_pool().await;
    let catalog = Arc::new(catalog);
    let market = Arc::new(StubMarketplace::new());
    market.set_price("sw0001", usd(10.0, 15.0, 4.0, 6.0));
    let service = build_service(pool.clone(), catalog.clone(), market);
    let state = AppState::new(pool, EventBus::new(100), service);
    (build_router(state), catalog)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn record_body(kind: &str, item_id: &str) -> Value {
    json!({
        "kind": kind,
        "item_id": item_id,
        "color_id": "4",
        "quantity_have": 2,
        "table_id": "table-1",
        "owner_id": "owner-1",
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "brickvault-meta");
    assert_eq!(body["active_batches"], 0);
}

#[tokio::test]
async fn test_enrich_parts_accepted_then_status() {
    let (app, catalog) = test_app().await;
    let (status, body) = send(&app, "POST", "/enrich/parts", Some(json!({ "ids": ["3001"] }))).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
    let batch_id = body["batch_id"].as_str().unwrap().to_string();

    // Poll until the background run finishes
    let mut last = Value::Null;
    for _ in 0..100 {
        let (status, body) = send(&app, "GET", &format!("/enrich/status/{}", batch_id), None).await;
        assert_eq!(status, StatusCode::OK);
        last = body;
        if last["state"] != "RUNNING" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(last["state"], "COMPLETED");
    assert_eq!(last["total_ids"], 1);
    assert_eq!(last["fetched"], 1);
    assert_eq!(catalog.part_calls(), 1);

    let (status, part) = send(&app, "GET", "/parts/3001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(part["element_name"], "Brick 2 x 4");
}

#[tokio::test]
async fn test_unknown_batch_is_not_found() {
    let (app, _) = test_app().await;
    let uri = format!("/enrich/status/{}", uuid::Uuid::new_v4());
    let (status, body) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_uncached_part_is_not_found() {
    let (app, catalog) = test_app().await;
    let (status, body) = send(&app, "GET", "/parts/3001", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(catalog.part_calls(), 0);
}

#[tokio::test]
async fn test_refresh_part() {
    let (app, catalog) = test_app().await;

    let (status, body) = send(&app, "POST", "/parts/3001/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_colors"].as_array().unwrap().len(), 2);

    // Unknown upstream: the sentinel row comes back
    let (status, body) = send(&app, "POST", "/parts/99999999/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalid"], true);
    let colors = body["available_colors"].as_array().unwrap();
    assert_eq!(colors.len(), 1);
    assert_eq!(colors[0]["empty"], true);
    assert_eq!(catalog.part_calls(), 2);
}

#[tokio::test]
async fn test_refresh_part_rate_limited() {
    let (app, _) = test_app_with(catalog().with_rate_limited_calls(1)).await;

    let (status, body) = send(&app, "POST", "/parts/3001/refresh", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert!(health["last_error"].is_string());

    // Nothing was stored, so the next refresh goes upstream again
    let (status, _) = send(&app, "POST", "/parts/3001/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_minifig_price_always_answers() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, "GET", "/minifigs/fig-000001/price?bricklink_id=sw0001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"]["new_avg"], 12.5);

    // No marketplace id and no name to resolve it with: zeroed price
    let (status, body) = send(&app, "GET", "/minifigs/fig-999999/price", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"]["new_avg"], 0.0);
}

#[tokio::test]
async fn test_record_lifecycle() {
    let (app, _) = test_app().await;

    let (status, created) = send(&app, "POST", "/records", Some(record_body("brick", " 3001 "))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["record"]["item_id"], "3001");
    assert_eq!(created["enrichment"]["accepted"], true);
    let uuid = created["record"]["uuid"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "PUT", &format!("/records/{}/item", uuid), Some(json!({ "item_id": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listed) = send(&app, "GET", "/tables/table-1/records?owner_id=owner-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["uuid"], uuid.as_str());

    let (status, _) = send(&app, "GET", "/tables/table-1/records?owner_id=owner-2", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", &format!("/records/{}", uuid), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "DELETE", &format!("/records/{}", uuid), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_empty_record_item_rejected() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, "POST", "/records", Some(record_body("minifig", ""))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}
