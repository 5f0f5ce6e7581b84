use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use crate::{auth::authorize_site, error::AppError, state::AppState};

/// `GET /api/sites/{id}/realtime` — sessions active within the TTL,
/// computed at read time from the heartbeat window.
pub async fn realtime(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;
    let result = state.engine.active_visitors(&site_id, Utc::now()).await?;
    Ok(Json(result))
}
