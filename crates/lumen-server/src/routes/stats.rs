use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use lumen_engine::range::BreakdownProperty;

use crate::{auth::authorize_site, error::AppError, state::AppState};

use super::query::RangeParams;

/// `GET /api/sites/{id}/stats` — summary metrics over a period.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let range = params.resolve_range(Utc::now())?;
    let result = state
        .engine
        .stats(&site_id, range, &params.filters())
        .await?;
    Ok(Json(json!({
        "results": result.summary,
        "query": {
            "site_id": site_id,
            "start_date": range.start.to_string(),
            "end_date": range.end.to_string(),
        }
    })))
}

/// `GET /api/sites/{id}/breakdown?property=…` — one row per distinct key
/// of the requested dimension, sorted descending by count.
pub async fn breakdown(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let range = params.resolve_range(Utc::now())?;
    let property = params
        .property
        .as_deref()
        .ok_or_else(|| AppError::Validation {
            field: "property".to_string(),
            message: "breakdown property is required".to_string(),
        })?;
    let property =
        BreakdownProperty::parse(property).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let rows = state
        .engine
        .breakdown(&site_id, range, property, &params.filters())
        .await?;
    Ok(Json(json!({
        "results": rows,
        "query": {
            "site_id": site_id,
            "property": params.property,
            "start_date": range.start.to_string(),
            "end_date": range.end.to_string(),
        }
    })))
}
