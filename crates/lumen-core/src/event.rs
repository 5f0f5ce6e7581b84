use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visitor action kinds accepted at the collect endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pageview,
    Custom,
    Error,
    Click,
    Scroll,
}

/// The payload the tracking script sends to POST /api/collect.
/// Wire field "type" maps to `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectPayload {
    pub site_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub path: String,
    pub referrer: Option<String>,
    /// Combined screen resolution string, e.g. "1920x1080".
    pub screen: Option<String>,
    pub language: Option<String>,
    /// Name of a custom event or an error label.
    pub name: Option<String>,
    /// Optional numeric value attached to custom events.
    pub value: Option<f64>,
    /// Time spent on the previous page, reported with the next pageview.
    pub duration_ms: Option<u64>,
    /// Click coordinates as percentages of the page dimensions.
    pub x_percent: Option<f64>,
    pub y_percent: Option<f64>,
    /// CSS selector-ish description of the clicked element.
    pub element: Option<String>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    /// Maximum scroll depth reached, 0–100.
    pub max_depth_percent: Option<f64>,
    /// Where the fold sat as a percentage of page height.
    pub fold_position_percent: Option<f64>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

/// Accepts either a single event or a batch array at POST /api/collect.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CollectOrBatch {
    Single(Box<CollectPayload>),
    Batch(Vec<CollectPayload>),
}

/// Click payload carried by `EventKind::Click` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickPayload {
    pub x_percent: f64,
    pub y_percent: f64,
    pub element: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Scroll payload carried by `EventKind::Scroll` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollPayload {
    pub max_depth_percent: f64,
    pub fold_position_percent: Option<f64>,
}

/// A validated, enriched event.
///
/// Exists only in memory between classification and folding — events are
/// never written to storage as rows. `identity` and `session` are `None`
/// when the salt store was unavailable at ingest time; such events still
/// count toward totals but carry no visitor granularity.
#[derive(Debug, Clone)]
pub struct Event {
    pub site_id: String,
    pub kind: EventKind,
    pub path: String,
    pub referrer_domain: Option<String>,
    pub identity: Option<String>,
    pub session: Option<String>,
    pub name: Option<String>,
    pub value: Option<f64>,
    pub duration_ms: Option<u64>,
    pub click: Option<ClickPayload>,
    pub scroll: Option<ScrollPayload>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub screen: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Extract the host from a full referrer URL.
///
/// Returns `None` if the referrer is empty or has no parseable host.
pub fn extract_referrer_domain(referrer: &str) -> Option<String> {
    if referrer.is_empty() {
        return None;
    }
    let stripped = referrer
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let domain = stripped.split('/').next()?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

/// Normalise a raw URL or path to a bare lowercase path.
///
/// Strips scheme/host, query string and fragment; empty input maps to "/".
pub fn normalize_path(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    let candidate = if let Some(scheme_idx) = without_query.find("://") {
        let rest = &without_query[(scheme_idx + 3)..];
        if let Some(path_idx) = rest.find('/') {
            &rest[path_idx..]
        } else {
            "/"
        }
    } else {
        without_query
    };
    if candidate.is_empty() {
        "/".to_string()
    } else {
        candidate.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_referrer_domain_https() {
        let domain = extract_referrer_domain("https://news.ycombinator.com/item?id=12345");
        assert_eq!(domain.as_deref(), Some("news.ycombinator.com"));
    }

    #[test]
    fn extract_referrer_domain_empty() {
        assert_eq!(extract_referrer_domain(""), None);
    }

    #[test]
    fn normalize_path_strips_host_and_query() {
        assert_eq!(normalize_path("https://example.com/pricing?ref=x#plans"), "/pricing");
        assert_eq!(normalize_path("/About"), "/about");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("https://example.com"), "/");
    }

    #[test]
    fn payload_kind_wire_name_is_type() {
        let raw = r#"{"site_id":"s1","type":"pageview","path":"/"}"#;
        let payload: CollectPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.kind, EventKind::Pageview);
    }
}
