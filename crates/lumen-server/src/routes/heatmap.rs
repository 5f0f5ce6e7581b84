use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use lumen_core::event::normalize_path;

use crate::{auth::authorize_site, error::AppError, state::AppState};

use super::query::RangeParams;

fn required_path(params: &RangeParams) -> Result<String, AppError> {
    params
        .path
        .as_deref()
        .map(normalize_path)
        .ok_or_else(|| AppError::Validation {
            field: "path".to_string(),
            message: "page path is required for heatmap queries".to_string(),
        })
}

/// `GET /api/sites/{id}/heatmap/clicks?path=…` — merged click density for
/// one page over the range.
pub async fn clicks(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let range = params.resolve_range(Utc::now())?;
    let path = required_path(&params)?;

    let bucket = state.engine.query_clicks(&site_id, &path, range).await?;
    let density = bucket.density();
    Ok(Json(json!({
        "total_clicks": bucket.total_clicks,
        "points": bucket.points,
        "density": density,
        "viewports": bucket.viewports,
        "query": { "site_id": site_id, "path": path },
    })))
}

/// `GET /api/sites/{id}/heatmap/scroll?path=…` — merged scroll-depth
/// density for one page over the range.
pub async fn scroll(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let range = params.resolve_range(Utc::now())?;
    let path = required_path(&params)?;

    let density = state.engine.query_scroll(&site_id, &path, range).await?;
    Ok(Json(json!({
        "results": density,
        "query": { "site_id": site_id, "path": path },
    })))
}
