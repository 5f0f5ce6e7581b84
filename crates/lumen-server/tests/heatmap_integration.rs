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

async fn collect(app: &axum::Router, body: Value, ip: &str) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/collect")
        .header("content-type", "application/json")
        .header("user-agent", BROWSER_UA)
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
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

#[tokio::test]
async fn two_clicks_from_distinct_viewports() {
    let (state, app) = setup().await;
    seed(&state).await;

    collect(
        &app,
        json!({
            "site_id": "S", "type": "click", "path": "/home",
            "x_percent": 45.5, "y_percent": 67.8,
            "element": "button.cta",
            "viewport_width": 1920, "viewport_height": 1080,
        }),
        "1.2.3.4",
    )
    .await;
    collect(
        &app,
        json!({
            "site_id": "S", "type": "click", "path": "/home",
            "x_percent": 10.0, "y_percent": 20.0,
            "viewport_width": 390, "viewport_height": 844,
        }),
        "5.6.7.8",
    )
    .await;

    let response = get(&app, "/api/sites/S/heatmap/clicks?path=/home&period=7d").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total_clicks"], json!(2));
    let viewports = body["viewports"].as_object().expect("viewports");
    assert_eq!(viewports.len(), 2);
    assert_eq!(viewports["1920x1080"], json!(1));
    assert_eq!(viewports["390x844"], json!(1));
}

#[tokio::test]
async fn click_without_coordinates_is_a_400() {
    let (state, app) = setup().await;
    seed(&state).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/collect")
        .header("content-type", "application/json")
        .header("user-agent", BROWSER_UA)
        .body(Body::from(
            json!({ "site_id": "S", "type": "click", "path": "/home" }).to_string(),
        ))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["field"], json!("x_percent"));
}

#[tokio::test]
async fn scroll_depths_land_in_bands() {
    let (state, app) = setup().await;
    seed(&state).await;

    for (depth, fold, ip) in [(35.0, 20.0, "1.1.1.1"), (92.0, 20.0, "2.2.2.2")] {
        collect(
            &app,
            json!({
                "site_id": "S", "type": "scroll", "path": "/article",
                "max_depth_percent": depth, "fold_position_percent": fold,
            }),
            ip,
        )
        .await;
    }

    let response = get(&app, "/api/sites/S/heatmap/scroll?path=/article&period=7d").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let bands = body["results"]["bands"].as_array().expect("bands");
    assert_eq!(bands.len(), 10);
    assert_eq!(bands[3], json!(1));
    assert_eq!(bands[9], json!(1));
    assert_eq!(body["results"]["session_count"], json!(2));
    assert_eq!(body["results"]["avg_fold_position"], json!(20.0));
}

#[tokio::test]
async fn heatmap_query_requires_a_path() {
    let (state, app) = setup().await;
    seed(&state).await;

    let response = get(&app, "/api/sites/S/heatmap/clicks?period=7d").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["field"], json!("path"));
}
