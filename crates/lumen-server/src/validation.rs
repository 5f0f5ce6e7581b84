//! Event classification: bot filter → PII scan → origin check.
//!
//! Validation is pure and ordered, short-circuiting on the first failure.
//! Bot traffic is ignored with a success-shaped outcome so crawlers are
//! never prompted to retry; PII and origin failures are client errors,
//! since they indicate a misbehaving integration.

use lumen_core::event::CollectPayload;
use lumen_core::patterns::Patterns;

/// Outcome of classifying one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted,
    /// Bot traffic: dropped silently, reported as success to the client.
    IgnoredBot,
    /// A free-text field matched a PII detector.
    PiiDetected { field: &'static str, detector: String },
    /// The declared request origin does not match the site's domain.
    OriginMismatch { origin: String },
}

pub fn classify(
    payload: &CollectPayload,
    user_agent: &str,
    origin: Option<&str>,
    site_domain: &str,
    dev_mode: bool,
    patterns: &Patterns,
) -> Classification {
    if patterns.is_bot(user_agent) {
        return Classification::IgnoredBot;
    }

    if let Some((field, detector)) = scan_pii(payload, patterns) {
        return Classification::PiiDetected {
            field,
            detector: detector.to_string(),
        };
    }

    if let Some(origin) = origin {
        if !origin_allowed(origin, site_domain, dev_mode) {
            return Classification::OriginMismatch {
                origin: origin.to_string(),
            };
        }
    }

    Classification::Accepted
}

/// Scan every free-text field; returns the first (field, detector) hit.
fn scan_pii<'p>(
    payload: &CollectPayload,
    patterns: &'p Patterns,
) -> Option<(&'static str, &'p str)> {
    let fields: [(&'static str, Option<&str>); 7] = [
        ("path", Some(payload.path.as_str())),
        ("referrer", payload.referrer.as_deref()),
        ("name", payload.name.as_deref()),
        ("element", payload.element.as_deref()),
        ("utm_source", payload.utm_source.as_deref()),
        ("utm_medium", payload.utm_medium.as_deref()),
        ("utm_campaign", payload.utm_campaign.as_deref()),
    ];
    fields.into_iter().find_map(|(field, value)| {
        let detector = patterns.find_pii(value?)?;
        Some((field, detector))
    })
}

/// Exact domain, its `www.` variant, or localhost in development.
fn origin_allowed(origin: &str, site_domain: &str, dev_mode: bool) -> bool {
    let Some(host) = origin_host(origin) else {
        return false;
    };
    let domain = site_domain.to_ascii_lowercase();
    if host == domain
        || host == format!("www.{domain}")
        || domain == format!("www.{host}")
    {
        return true;
    }
    dev_mode && (host == "localhost" || host == "127.0.0.1")
}

fn origin_host(origin: &str) -> Option<String> {
    url::Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
