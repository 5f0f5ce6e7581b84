//! Deterministic store-key construction.
//!
//! Every piece of engine state lives under a predictable key so that range
//! queries can address per-day buckets directly instead of scanning. Paths
//! are form-urlencoded before they enter a key because raw paths contain
//! `/` and `?`, which would collide with the `:`-separated key grammar on
//! backends that treat keys as flat strings.

use chrono::NaiveDate;

/// `{siteId}:{date}` — the daily rollup.
pub fn rollup(site_id: &str, date: NaiveDate) -> String {
    format!("{site_id}:{date}")
}

/// `{siteId}:realtime` — the active-visitor window.
pub fn realtime(site_id: &str) -> String {
    format!("{site_id}:realtime")
}

/// `{siteId}:click:{date}:{pathEncoded}` — click heatmap bucket.
pub fn heatmap_click(site_id: &str, date: NaiveDate, path: &str) -> String {
    format!("{site_id}:click:{date}:{}", encode_path(path))
}

/// `{siteId}:scroll:{date}:{pathEncoded}` — scroll heatmap bucket.
pub fn heatmap_scroll(site_id: &str, date: NaiveDate, path: &str) -> String {
    format!("{site_id}:scroll:{date}:{}", encode_path(path))
}

/// `{siteId}:activity:{date}` — per-session activity sequences for funnels.
pub fn activity(site_id: &str, date: NaiveDate) -> String {
    format!("{site_id}:activity:{date}")
}

/// `{siteId}:seen:{identityHash}` — cross-day first-seen marker.
pub fn seen_marker(site_id: &str, identity_hash: &str) -> String {
    format!("{site_id}:seen:{identity_hash}")
}

/// `salt:{date}` — the daily hashing secret.
pub fn salt(date: NaiveDate) -> String {
    format!("salt:{date}")
}

/// `site:{id}` — site metadata record.
pub fn site(site_id: &str) -> String {
    format!("site:{site_id}")
}

/// `site:` listing prefix.
pub const SITE_PREFIX: &str = "site:";

/// `{siteId}:funnel:{id}` — funnel definition.
pub fn funnel(site_id: &str, funnel_id: &str) -> String {
    format!("{site_id}:funnel:{funnel_id}")
}

pub fn funnel_prefix(site_id: &str) -> String {
    format!("{site_id}:funnel:")
}

/// `{siteId}:goal:{id}` — goal definition.
pub fn goal(site_id: &str, goal_id: &str) -> String {
    format!("{site_id}:goal:{goal_id}")
}

pub fn goal_prefix(site_id: &str) -> String {
    format!("{site_id}:goal:")
}

/// `token:{token}` — bearer token → user id.
pub fn token(token: &str) -> String {
    format!("token:{token}")
}

fn encode_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}
