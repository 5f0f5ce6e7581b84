use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use lumen_core::config::Config;
use lumen_server::app::build_app;
use lumen_server::state::AppState;
use lumen_store::{KvStore, MemoryStore};

const BROWSER_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

async fn setup() -> (Arc<AppState>, axum::Router) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(
        store,
        Config {
            rate_limit_disable: true,
            geoip_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
            ..Config::default()
        },
    ));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

async fn seed(state: &AppState) {
    state.store.set("token:tok", "user_1").await.unwrap();
    let site = json!({
        "id": "S",
        "owner_id": "user_1",
        "domain": "example.com",
        "name": "Test",
        "created_at": "2024-01-15T00:00:00Z",
    });
    state.store.set("site:S", &site.to_string()).await.unwrap();
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", "Bearer tok")
        .body(Body::from(body.to_string()))
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn get(app: &axum::Router, uri: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", "Bearer tok")
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn ingest_pageviews(app: &axum::Router, count: usize) {
    for i in 0..count {
        let body = json!({ "site_id": "S", "type": "pageview", "path": format!("/p{i}") });
        let request = Request::builder()
            .method("POST")
            .uri("/api/collect")
            .header("content-type", "application/json")
            .header("user-agent", BROWSER_UA)
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::from(body.to_string()))
            .expect("build request");
        let response = app.clone().oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

fn goal_request(metric: &str, target: f64, comparator: &str) -> Value {
    json!({
        "name": format!("{metric} {comparator} {target}"),
        "metric": metric,
        "target": target,
        "comparator": comparator,
        "period": "7d",
    })
}

#[tokio::test]
async fn goal_target_is_clamped_to_one_at_definition() {
    let (state, app) = setup().await;
    seed(&state).await;

    let response = post_json(&app, "/api/sites/S/goals", goal_request("pageviews", 0.0, "gte")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["target"], json!(1.0));
}

#[tokio::test]
async fn unknown_metric_is_a_400() {
    let (state, app) = setup().await;
    seed(&state).await;

    let response = post_json(&app, "/api/sites/S/goals", goal_request("nonsense", 10.0, "gte")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gte_goal_completes_when_value_reaches_target() {
    let (state, app) = setup().await;
    seed(&state).await;
    ingest_pageviews(&app, 3).await;

    let response = post_json(&app, "/api/sites/S/goals", goal_request("pageviews", 2.0, "gte")).await;
    let goal_id = json_body(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = get(&app, &format!("/api/sites/S/goals/{goal_id}/progress")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["results"]["current_value"], json!(3.0));
    assert_eq!(body["results"]["is_complete"], json!(true));
    assert_eq!(body["results"]["progress_percent"], json!(100.0));
}

#[tokio::test]
async fn lte_goal_completes_when_value_stays_below_target() {
    let (state, app) = setup().await;
    seed(&state).await;
    ingest_pageviews(&app, 3).await;

    let response = post_json(&app, "/api/sites/S/goals", goal_request("pageviews", 5.0, "lte")).await;
    let goal_id = json_body(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = get(&app, &format!("/api/sites/S/goals/{goal_id}/progress")).await;
    let body = json_body(response).await;
    assert_eq!(body["results"]["is_complete"], json!(true));
    assert_eq!(body["results"]["progress_percent"], json!(100.0));
}

#[tokio::test]
async fn value_equal_to_target_completes_under_both_comparators() {
    let (state, app) = setup().await;
    seed(&state).await;
    ingest_pageviews(&app, 2).await;

    for comparator in ["gte", "lte"] {
        let response =
            post_json(&app, "/api/sites/S/goals", goal_request("pageviews", 2.0, comparator)).await;
        let goal_id = json_body(response).await["data"]["id"]
            .as_str()
            .expect("id")
            .to_string();

        let response = get(&app, &format!("/api/sites/S/goals/{goal_id}/progress")).await;
        let body = json_body(response).await;
        assert_eq!(
            body["results"]["is_complete"],
            json!(true),
            "comparator {comparator}"
        );
    }
}

#[tokio::test]
async fn unknown_goal_is_a_404() {
    let (state, app) = setup().await;
    seed(&state).await;

    let response = get(&app, "/api/sites/S/goals/goal_missing/progress").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn goal_crud_roundtrip() {
    let (state, app) = setup().await;
    seed(&state).await;

    let response = post_json(&app, "/api/sites/S/goals", goal_request("pageviews", 100.0, "gte")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let goal_id = json_body(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = get(&app, "/api/sites/S/goals").await;
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().expect("goals").len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/sites/S/goals/{goal_id}"))
        .header("authorization", "Bearer tok")
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/sites/S/goals/{goal_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
