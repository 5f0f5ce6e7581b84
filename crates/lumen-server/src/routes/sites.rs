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

use lumen_store::{keys, KvStore, KvStoreExt};

use crate::{
    auth::{authenticate, authorize_site, Site},
    error::AppError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub domain: String,
}

/// `POST /api/sites` — register a site owned by the caller.
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSiteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = authenticate(&state, &headers).await?;

    let domain = req.domain.trim().to_ascii_lowercase();
    if domain.is_empty() || domain.contains('/') || domain.contains(' ') {
        return Err(AppError::Validation {
            field: "domain".to_string(),
            message: "must be a bare domain name".to_string(),
        });
    }
    if req.name.trim().is_empty() {
        return Err(AppError::Validation {
            field: "name".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let site = Site {
        id: format!("site_{}", uuid::Uuid::new_v4().simple()),
        owner_id: user_id,
        domain,
        name: req.name.trim().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    state
        .store
        .set_json(&keys::site(&site.id), &site)
        .await
        .map_err(AppError::Internal)?;

    Ok((StatusCode::CREATED, Json(json!({ "data": site }))))
}

/// `GET /api/sites` — the caller's sites.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = authenticate(&state, &headers).await?;

    let mut sites = Vec::new();
    for key in state
        .store
        .list(keys::SITE_PREFIX)
        .await
        .map_err(AppError::Internal)?
    {
        if let Some(site) = state
            .store
            .get_json::<Site>(&key)
            .await
            .map_err(AppError::Internal)?
        {
            if site.owner_id == user_id {
                sites.push(site);
            }
        }
    }

    Ok(Json(json!({ "data": sites })))
}

/// `GET /api/sites/{id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let site = authorize_site(&state, &headers, &site_id).await?;
    Ok(Json(json!({ "data": site })))
}

/// `DELETE /api/sites/{id}` — remove the site and every aggregate stored
/// under it (rollups, heatmap buckets, activity, markers, funnels, goals).
///
/// This is the explicit-deletion path; aggregates are otherwise never
/// removed.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize_site(&state, &headers, &site_id).await?;

    // All per-site state lives under the `{siteId}:` key prefix.
    let prefix = format!("{site_id}:");
    for key in state
        .store
        .list(&prefix)
        .await
        .map_err(AppError::Internal)?
    {
        state.store.delete(&key).await.map_err(AppError::Internal)?;
    }
    state
        .store
        .delete(&keys::site(&site_id))
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(json!({ "success": true })))
}
