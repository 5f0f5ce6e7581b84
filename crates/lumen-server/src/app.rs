use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — permissive CORS for the collect endpoint (the tracking
///    script runs on third-party sites; browsers need CORS headers).
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/collect", post(routes::collect::collect))
        .route(
            "/api/sites",
            get(routes::sites::list).post(routes::sites::create),
        )
        .route(
            "/api/sites/{id}",
            get(routes::sites::get).delete(routes::sites::delete),
        )
        .route("/api/sites/{id}/stats", get(routes::stats::stats))
        .route("/api/sites/{id}/breakdown", get(routes::stats::breakdown))
        .route("/api/sites/{id}/realtime", get(routes::realtime::realtime))
        .route(
            "/api/sites/{id}/heatmap/clicks",
            get(routes::heatmap::clicks),
        )
        .route(
            "/api/sites/{id}/heatmap/scroll",
            get(routes::heatmap::scroll),
        )
        .route(
            "/api/sites/{id}/funnels",
            get(routes::funnels::list).post(routes::funnels::create),
        )
        .route(
            "/api/sites/{id}/funnels/{funnel_id}",
            get(routes::funnels::get).delete(routes::funnels::delete),
        )
        .route(
            "/api/sites/{id}/funnels/{funnel_id}/results",
            get(routes::funnels::results),
        )
        .route(
            "/api/sites/{id}/goals",
            get(routes::goals::list).post(routes::goals::create),
        )
        .route(
            "/api/sites/{id}/goals/{goal_id}",
            get(routes::goals::get).delete(routes::goals::delete),
        )
        .route(
            "/api/sites/{id}/goals/{goal_id}/progress",
            get(routes::goals::progress),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
