use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use lumen_engine::goal::{self, Comparator};

use crate::{auth::authorize_site, error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub name: String,
    pub metric: String,
    pub target: f64,
    pub comparator: Comparator,
    pub period: String,
    #[serde(default)]
    pub notify: bool,
}

/// `POST /api/sites/{id}/goals` — define a goal. The target is clamped to
/// a minimum of 1 at definition time.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateGoalRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    if req.name.trim().is_empty() {
        return Err(AppError::Validation {
            field: "name".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    goal::validate_definition(&req.metric, &req.period)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let goal = state
        .engine
        .create_goal(
            &site_id,
            req.name.trim(),
            &req.metric,
            req.target,
            req.comparator,
            &req.period,
            req.notify,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": goal }))))
}

/// `GET /api/sites/{id}/goals`.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let goals = state.engine.list_goals(&site_id).await?;
    Ok(Json(json!({ "data": goals })))
}

/// `GET /api/sites/{id}/goals/{goal_id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((site_id, goal_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let goal = state
        .engine
        .get_goal(&site_id, &goal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown goal: {goal_id}")))?;
    Ok(Json(json!({ "data": goal })))
}

/// `DELETE /api/sites/{id}/goals/{goal_id}`.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((site_id, goal_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    if !state.engine.delete_goal(&site_id, &goal_id).await? {
        return Err(AppError::NotFound(format!("Unknown goal: {goal_id}")));
    }
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/sites/{id}/goals/{goal_id}/progress` — current value,
/// progress percentage and completion for the goal's own period.
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Path((site_id, goal_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let goal = state
        .engine
        .get_goal(&site_id, &goal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown goal: {goal_id}")))?;

    let progress = state.engine.goal_progress(&goal, Utc::now()).await?;
    Ok(Json(json!({ "results": progress })))
}
