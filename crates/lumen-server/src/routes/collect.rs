use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use lumen_core::{
    event::{
        extract_referrer_domain, normalize_path, ClickPayload, CollectOrBatch, CollectPayload,
        Event, EventKind, ScrollPayload,
    },
    identity,
};

use crate::{
    auth::get_site,
    error::AppError,
    state::AppState,
    validation::{classify, Classification},
};

const MAX_BATCH: usize = 50;

/// `POST /api/collect` — ingest a single event or a batch of up to 50.
///
/// No auth required; events for unknown `site_id` values are rejected with
/// 404. Validation runs bot filter → PII scan → origin check per payload:
/// bot traffic is dropped silently (the response still reads success so
/// crawlers are not retried into the filter), PII and origin failures are
/// client errors. Accepted events are enriched — identity/session hashes
/// from the daily salt, GeoIP country, user-agent classification — and
/// folded into the per-day aggregates before the response is sent.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn collect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CollectOrBatch>,
) -> Result<impl IntoResponse, AppError> {
    let payloads: Vec<CollectPayload> = match payload {
        CollectOrBatch::Single(p) => vec![*p],
        CollectOrBatch::Batch(v) => v,
    };

    if payloads.len() > MAX_BATCH {
        return Err(AppError::BatchTooLarge(payloads.len()));
    }
    if payloads.is_empty() {
        return Err(AppError::BadRequest("empty batch".to_string()));
    }

    let client_ip = extract_client_ip(&headers);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    if !state.check_rate_limit(&client_ip).await {
        return Err(AppError::RateLimited);
    }

    let now = Utc::now();
    let geo = lookup_geo(&state.config.geoip_path, &client_ip);
    let ua_info = parse_user_agent(&user_agent);

    // Salt-store failure degrades to unattributed ingestion: events still
    // count, visitor and session granularity is dropped.
    let day_salt = match state.engine.daily_salt(now.date_naive()).await {
        Ok(salt) => Some(salt),
        Err(error) => {
            warn!(%error, "daily salt unavailable — ingesting unattributed");
            None
        }
    };

    for p in payloads {
        let site = get_site(&state, &p.site_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Unknown site_id: {}", p.site_id)))?;

        match classify(
            &p,
            &user_agent,
            origin,
            &site.domain,
            state.config.dev_mode,
            &state.patterns,
        ) {
            Classification::Accepted => {}
            Classification::IgnoredBot => continue,
            Classification::PiiDetected { field, detector } => {
                return Err(AppError::Validation {
                    field: field.to_string(),
                    message: format!("field matches the {detector} PII detector"),
                });
            }
            Classification::OriginMismatch { origin } => {
                return Err(AppError::Validation {
                    field: "origin".to_string(),
                    message: format!("origin {origin} does not match the site domain"),
                });
            }
        }

        let identity = day_salt
            .as_deref()
            .map(|salt| identity::identity_hash(salt, &p.site_id, &client_ip, &user_agent));
        let session = identity
            .as_deref()
            .map(|id| identity::session_hash(id, identity::session_window(now)));

        let click = build_click(&p)?;
        let scroll = build_scroll(&p)?;

        let event = Event {
            site_id: p.site_id,
            kind: p.kind,
            path: normalize_path(&p.path),
            referrer_domain: p.referrer.as_deref().and_then(extract_referrer_domain),
            identity,
            session,
            name: p.name,
            value: p.value,
            duration_ms: p.duration_ms,
            click,
            scroll,
            browser: ua_info.as_ref().map(|u| u.browser.clone()),
            os: ua_info.as_ref().map(|u| u.os.clone()),
            device_type: ua_info.as_ref().map(|u| u.device_type.clone()),
            screen: p.screen,
            language: p.language,
            country: geo.as_ref().and_then(|g| g.country.clone()),
            region: geo.as_ref().and_then(|g| g.region.clone()),
            city: geo.as_ref().and_then(|g| g.city.clone()),
            utm_source: p.utm_source,
            utm_medium: p.utm_medium,
            utm_campaign: p.utm_campaign,
            created_at: now,
        };

        state.engine.ingest(&event).await?;
    }

    Ok(Json(json!({ "success": true })))
}

fn build_click(p: &CollectPayload) -> Result<Option<ClickPayload>, AppError> {
    if p.kind != EventKind::Click {
        return Ok(None);
    }
    let require = |field: &str, value: Option<f64>| {
        value.ok_or_else(|| AppError::Validation {
            field: field.to_string(),
            message: "required for click events".to_string(),
        })
    };
    let x_percent = require("x_percent", p.x_percent)?;
    let y_percent = require("y_percent", p.y_percent)?;
    let viewport_width = p.viewport_width.ok_or_else(|| AppError::Validation {
        field: "viewport_width".to_string(),
        message: "required for click events".to_string(),
    })?;
    let viewport_height = p.viewport_height.ok_or_else(|| AppError::Validation {
        field: "viewport_height".to_string(),
        message: "required for click events".to_string(),
    })?;
    Ok(Some(ClickPayload {
        x_percent,
        y_percent,
        element: p.element.clone(),
        viewport_width,
        viewport_height,
    }))
}

fn build_scroll(p: &CollectPayload) -> Result<Option<ScrollPayload>, AppError> {
    if p.kind != EventKind::Scroll {
        return Ok(None);
    }
    let max_depth_percent = p.max_depth_percent.ok_or_else(|| AppError::Validation {
        field: "max_depth_percent".to_string(),
        message: "required for scroll events".to_string(),
    })?;
    Ok(Some(ScrollPayload {
        max_depth_percent,
        fold_position_percent: p.fold_position_percent,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the real client IP from `X-Forwarded-For` (first entry).
///
/// Falls back to `"unknown"` when the header is absent. The IP exists only
/// for rate limiting and the identity-hash computation — it is never
/// stored or logged.
fn extract_client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// GeoIP result from a MaxMind lookup.
struct GeoInfo {
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
}

/// Attempt a GeoIP lookup for `ip` using the MaxMind database at `path`.
///
/// Returns `None` if the database file is missing or the IP cannot be
/// parsed; events are then stored with empty geo dimensions rather than
/// failing ingestion.
fn lookup_geo(path: &str, ip: &str) -> Option<GeoInfo> {
    use std::net::IpAddr;
    use std::str::FromStr;

    if !std::path::Path::new(path).exists() {
        return None;
    }

    let reader = maxminddb::Reader::open_readfile(path).ok()?;
    let ip_addr = IpAddr::from_str(ip).ok()?;
    let record: maxminddb::geoip2::City = reader.lookup(ip_addr).ok()?;

    let country = record
        .country
        .as_ref()
        .and_then(|c| c.iso_code)
        .map(|s| s.to_string());
    let region = record
        .subdivisions
        .as_ref()
        .and_then(|subs| subs.first())
        .and_then(|sub| sub.names.as_ref())
        .and_then(|names| names.get("en"))
        .map(|s| s.to_string());
    let city = record
        .city
        .as_ref()
        .and_then(|c| c.names.as_ref())
        .and_then(|names| names.get("en"))
        .map(|s| s.to_string());

    Some(GeoInfo {
        country,
        region,
        city,
    })
}

/// Parsed User-Agent fields.
struct UaInfo {
    browser: String,
    os: String,
    device_type: String,
}

/// Parse a `User-Agent` string via the `woothee` crate.
///
/// Returns `None` if the UA string is empty or cannot be classified.
fn parse_user_agent(user_agent: &str) -> Option<UaInfo> {
    if user_agent.is_empty() {
        return None;
    }

    let result = woothee::parser::Parser::new().parse(user_agent)?;

    // woothee `category` maps to our device_type convention:
    //   "smartphone"/"mobilephone" → "mobile", "tablet" → "tablet",
    //   everything else → "desktop" (conservative default).
    let device_type = match result.category {
        "smartphone" | "mobilephone" => "mobile",
        "tablet" => "tablet",
        _ => "desktop",
    }
    .to_string();

    Some(UaInfo {
        browser: result.name.to_string(),
        os: result.os.to_string(),
        device_type,
    })
}
