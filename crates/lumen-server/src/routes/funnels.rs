use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use lumen_engine::funnel::{self, FunnelStep};

use crate::{auth::authorize_site, error::AppError, state::AppState};

use super::query::RangeParams;

#[derive(Debug, Deserialize)]
pub struct CreateFunnelRequest {
    pub name: String,
    pub steps: Vec<FunnelStep>,
}

/// `POST /api/sites/{id}/funnels` — define a funnel. Step-count bounds
/// (2–10) are enforced here, not at evaluation time.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateFunnelRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    if req.name.trim().is_empty() {
        return Err(AppError::Validation {
            field: "name".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    funnel::validate_steps(&req.steps).map_err(|e| AppError::Validation {
        field: "steps".to_string(),
        message: e.to_string(),
    })?;

    let funnel = state
        .engine
        .create_funnel(&site_id, req.name.trim(), req.steps)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": funnel }))))
}

/// `GET /api/sites/{id}/funnels`.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let funnels = state.engine.list_funnels(&site_id).await?;
    Ok(Json(json!({ "data": funnels })))
}

/// `GET /api/sites/{id}/funnels/{funnel_id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((site_id, funnel_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let funnel = state
        .engine
        .get_funnel(&site_id, &funnel_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown funnel: {funnel_id}")))?;
    Ok(Json(json!({ "data": funnel })))
}

/// `DELETE /api/sites/{id}/funnels/{funnel_id}`.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((site_id, funnel_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    if !state.engine.delete_funnel(&site_id, &funnel_id).await? {
        return Err(AppError::NotFound(format!("Unknown funnel: {funnel_id}")));
    }
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/sites/{id}/funnels/{funnel_id}/results` — per-step session
/// counts and conversion rates over the range.
pub async fn results(
    State(state): State<Arc<AppState>>,
    Path((site_id, funnel_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let range = params.resolve_range(Utc::now())?;
    let funnel = state
        .engine
        .get_funnel(&site_id, &funnel_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown funnel: {funnel_id}")))?;

    let results = state.engine.funnel_results(&funnel, range).await?;
    Ok(Json(json!({
        "results": results,
        "query": {
            "site_id": site_id,
            "start_date": range.start.to_string(),
            "end_date": range.end.to_string(),
        }
    })))
}
