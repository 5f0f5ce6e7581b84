//! Bearer-token authentication and site-ownership checks.
//!
//! The account layer proper (signup, session issuance, billing) lives
//! outside this service; what the engine needs from it is a resolved user
//! id per request and the site → owner mapping. Tokens resolve through the
//! store (`token:{token}` → user id) so the account service can mint and
//! revoke them without touching this process.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use lumen_store::{keys, KvStore, KvStoreExt};

use crate::{error::AppError, state::AppState};

/// Site metadata record, the ownership boundary for every query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub owner_id: String,
    pub domain: String,
    pub name: String,
    pub created_at: String,
}

/// Resolve the caller's user id from the `Authorization: Bearer` header.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    state
        .store
        .get(&keys::token(token))
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::Unauthorized)
}

pub async fn get_site(state: &AppState, site_id: &str) -> Result<Option<Site>, AppError> {
    state
        .store
        .get_json(&keys::site(site_id))
        .await
        .map_err(AppError::Internal)
}

/// Authenticate the caller and verify they own `site_id`.
///
/// A site owned by someone else yields a bare 403 — the response body
/// carries no hint that the site exists.
pub async fn authorize_site(
    state: &AppState,
    headers: &HeaderMap,
    site_id: &str,
) -> Result<Site, AppError> {
    let user_id = authenticate(state, headers).await?;
    let site = get_site(state, site_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown site: {site_id}")))?;
    if site.owner_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(site)
}
