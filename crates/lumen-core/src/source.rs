//! Traffic-source classification.
//!
//! Maps a pageview's referrer domain and UTM fields to one of a small set
//! of channel classes. UTM medium takes precedence over the referrer, and
//! an absent referrer with no UTM data means a direct visit.

const SEARCH_ENGINES: &[&str] = &[
    "google.",
    "bing.com",
    "duckduckgo.com",
    "search.yahoo.",
    "yandex.",
    "baidu.com",
    "ecosia.org",
    "startpage.com",
    "qwant.com",
    "search.brave.com",
];

const SOCIAL_NETWORKS: &[&str] = &[
    "facebook.com",
    "m.facebook.com",
    "l.facebook.com",
    "instagram.com",
    "l.instagram.com",
    "twitter.com",
    "t.co",
    "x.com",
    "linkedin.com",
    "lnkd.in",
    "reddit.com",
    "out.reddit.com",
    "pinterest.",
    "tiktok.com",
    "youtube.com",
    "news.ycombinator.com",
    "mastodon.",
    "bsky.app",
];

const PAID_MEDIUMS: &[&str] = &["cpc", "ppc", "paid", "paidsearch", "paid_social", "display"];

/// Classify one pageview into a traffic-source class.
pub fn classify(
    referrer_domain: Option<&str>,
    utm_source: Option<&str>,
    utm_medium: Option<&str>,
) -> &'static str {
    let medium = utm_medium.map(str::trim).filter(|m| !m.is_empty());
    if let Some(medium) = medium {
        let medium = medium.to_ascii_lowercase();
        if PAID_MEDIUMS.iter().any(|m| *m == medium) {
            return "Paid";
        }
        if medium == "email" {
            return "Email";
        }
        if medium == "social" {
            return "Social";
        }
        if medium == "organic" {
            return "Organic Search";
        }
    }

    if let Some(domain) = referrer_domain.map(str::trim).filter(|d| !d.is_empty()) {
        let domain = domain.to_ascii_lowercase();
        if SEARCH_ENGINES.iter().any(|s| domain.contains(s)) {
            return "Organic Search";
        }
        if SOCIAL_NETWORKS.iter().any(|s| domain.contains(s)) {
            return "Social";
        }
        return "Referral";
    }

    // A tagged campaign with no referrer is still attributable traffic.
    if utm_source.map(str::trim).filter(|s| !s.is_empty()).is_some() {
        return "Campaign";
    }

    "Direct"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_referrer_no_utm_is_direct() {
        assert_eq!(classify(None, None, None), "Direct");
        assert_eq!(classify(Some(""), None, Some("  ")), "Direct");
    }

    #[test]
    fn search_engines_are_organic() {
        assert_eq!(classify(Some("www.google.com"), None, None), "Organic Search");
        assert_eq!(classify(Some("duckduckgo.com"), None, None), "Organic Search");
    }

    #[test]
    fn social_referrers_are_social() {
        assert_eq!(classify(Some("news.ycombinator.com"), None, None), "Social");
        assert_eq!(classify(Some("t.co"), None, None), "Social");
    }

    #[test]
    fn utm_medium_wins_over_referrer() {
        assert_eq!(classify(Some("www.google.com"), Some("adwords"), Some("cpc")), "Paid");
        assert_eq!(classify(None, Some("newsletter"), Some("email")), "Email");
    }

    #[test]
    fn unknown_referrer_is_referral() {
        assert_eq!(classify(Some("example.org"), None, None), "Referral");
    }

    #[test]
    fn tagged_source_without_referrer_is_campaign() {
        assert_eq!(classify(None, Some("partner-x"), None), "Campaign");
    }
}
