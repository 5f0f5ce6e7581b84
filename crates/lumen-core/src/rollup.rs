//! The per-site, per-day rollup and its merge law.
//!
//! Every stored field is one of three kinds — counter, dimension map, or
//! sum+count accumulator — plus the per-session statistics map whose values
//! merge with min/max/add combines. All of them share one property: merging
//! is associative and commutative, so folding an event stream in any order,
//! or merging partial rollups produced by racing writers, converges on the
//! same object. Anything that cannot be expressed as such a combine (bounce
//! counts, durations, landing/exit tables) is derived at read time instead
//! of being stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventKind};
use crate::source;

/// The one merge operation applied uniformly per field kind.
pub trait Merge {
    fn merge(&mut self, other: Self);
}

impl Merge for u64 {
    fn merge(&mut self, other: Self) {
        *self += other;
    }
}

impl<V: Merge> Merge for BTreeMap<String, V> {
    fn merge(&mut self, other: Self) {
        for (key, value) in other {
            match self.get_mut(&key) {
                Some(existing) => existing.merge(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}

/// Accumulator for averaged metrics. The mean is never stored — storing it
/// would break commutativity — only derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SumCount {
    pub sum: f64,
    pub count: u64,
}

impl SumCount {
    pub fn record(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Mean of the recorded values; 0 when nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Merge for SumCount {
    fn merge(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// A counter keyed by dimension value (page path, browser name, country…).
pub type DimMap = BTreeMap<String, u64>;

/// Per-session statistics, keyed by session hash in the rollup.
///
/// first/entry merge as argmin over timestamps, last/exit as argmax, both
/// with lexical path tie-breaks so merges stay commutative when two writers
/// observed events at the same millisecond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStat {
    pub pageviews: u64,
    /// Qualifying engagement events (custom events, clicks).
    pub engaged: u64,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub entry_path: String,
    pub exit_path: String,
}

impl SessionStat {
    fn new(path: &str, at_ms: i64) -> Self {
        Self {
            pageviews: 0,
            engaged: 0,
            first_seen_ms: at_ms,
            last_seen_ms: at_ms,
            entry_path: path.to_string(),
            exit_path: path.to_string(),
        }
    }

    fn observe(&mut self, path: &str, at_ms: i64) {
        if (at_ms, path) < (self.first_seen_ms, self.entry_path.as_str()) {
            self.first_seen_ms = at_ms;
            self.entry_path = path.to_string();
        }
        if (at_ms, path) > (self.last_seen_ms, self.exit_path.as_str()) {
            self.last_seen_ms = at_ms;
            self.exit_path = path.to_string();
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.last_seen_ms - self.first_seen_ms
    }

    /// Exactly one pageview and no qualifying engagement event.
    pub fn is_bounce(&self) -> bool {
        self.pageviews == 1 && self.engaged == 0
    }
}

impl Merge for SessionStat {
    fn merge(&mut self, other: Self) {
        self.pageviews += other.pageviews;
        self.engaged += other.engaged;
        if (other.first_seen_ms, other.entry_path.as_str())
            < (self.first_seen_ms, self.entry_path.as_str())
        {
            self.first_seen_ms = other.first_seen_ms;
            self.entry_path = other.entry_path;
        }
        if (other.last_seen_ms, other.exit_path.as_str())
            > (self.last_seen_ms, self.exit_path.as_str())
        {
            self.last_seen_ms = other.last_seen_ms;
            self.exit_path = other.exit_path;
        }
    }
}

/// Whether a visitor's identity hash was seen on a prior day for the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorStatus {
    New,
    Returning,
}

/// One pre-aggregated summary object per (site, UTC date).
///
/// All fields default to their zero value so a rollup deserialised from an
/// older schema version merges cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyRollup {
    pub pageviews: u64,
    pub custom_events: u64,
    pub errors: u64,
    pub new_visitors: u64,
    pub returning_visitors: u64,
    /// Identity hash → event count. Unique visitors = number of keys.
    pub visitors: BTreeMap<String, u64>,
    /// Session hash → session statistics.
    pub sessions: BTreeMap<String, SessionStat>,
    pub pages: DimMap,
    pub referrers: DimMap,
    pub sources: DimMap,
    pub devices: DimMap,
    pub browsers: DimMap,
    pub operating_systems: DimMap,
    pub screens: DimMap,
    pub languages: DimMap,
    pub countries: DimMap,
    pub cities: DimMap,
    pub campaigns: DimMap,
    pub event_names: DimMap,
    pub error_labels: DimMap,
    pub time_on_page_ms: SumCount,
    pub scroll_depth: SumCount,
}

fn bump(map: &mut DimMap, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

fn bump_opt(map: &mut DimMap, key: Option<&str>) {
    if let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) {
        *map.entry(key.to_string()).or_insert(0) += 1;
    }
}

impl DailyRollup {
    /// Fold one validated event into the rollup as pure addition.
    ///
    /// `status` is the new-vs-returning classification for the event's
    /// identity, consulted only the first time that identity appears in
    /// this rollup; `None` means the classification was unavailable
    /// (unattributed event or seen-marker store failure).
    pub fn fold(&mut self, event: &Event, status: Option<VisitorStatus>) {
        let at_ms = event.created_at.timestamp_millis();

        if let Some(identity) = event.identity.as_deref() {
            if !self.visitors.contains_key(identity) {
                match status {
                    Some(VisitorStatus::New) => self.new_visitors += 1,
                    Some(VisitorStatus::Returning) => self.returning_visitors += 1,
                    None => {}
                }
            }
            *self.visitors.entry(identity.to_string()).or_insert(0) += 1;
        }

        if let Some(session) = event.session.as_deref() {
            let stat = self
                .sessions
                .entry(session.to_string())
                .or_insert_with(|| SessionStat::new(&event.path, at_ms));
            stat.observe(&event.path, at_ms);
            match event.kind {
                EventKind::Pageview => stat.pageviews += 1,
                EventKind::Custom | EventKind::Click => stat.engaged += 1,
                EventKind::Error | EventKind::Scroll => {}
            }
        }

        match event.kind {
            EventKind::Pageview => {
                self.pageviews += 1;
                bump(&mut self.pages, &event.path);
                bump_opt(&mut self.referrers, event.referrer_domain.as_deref());
                bump(
                    &mut self.sources,
                    source::classify(
                        event.referrer_domain.as_deref(),
                        event.utm_source.as_deref(),
                        event.utm_medium.as_deref(),
                    ),
                );
                bump_opt(&mut self.devices, event.device_type.as_deref());
                bump_opt(&mut self.browsers, event.browser.as_deref());
                bump_opt(&mut self.operating_systems, event.os.as_deref());
                bump_opt(&mut self.screens, event.screen.as_deref());
                bump_opt(&mut self.languages, event.language.as_deref());
                bump_opt(&mut self.countries, event.country.as_deref());
                bump_opt(&mut self.cities, event.city.as_deref());
                bump_opt(&mut self.campaigns, event.utm_campaign.as_deref());
            }
            EventKind::Custom => {
                self.custom_events += 1;
                bump_opt(&mut self.event_names, event.name.as_deref());
            }
            EventKind::Error => {
                self.errors += 1;
                bump_opt(&mut self.error_labels, event.name.as_deref());
            }
            EventKind::Click => {}
            EventKind::Scroll => {
                if let Some(scroll) = &event.scroll {
                    self.scroll_depth.record(scroll.max_depth_percent);
                }
            }
        }

        if let Some(duration_ms) = event.duration_ms {
            self.time_on_page_ms.record(duration_ms as f64);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn unique_visitors(&self) -> u64 {
        self.visitors.len() as u64
    }

    pub fn unique_sessions(&self) -> u64 {
        self.sessions.len() as u64
    }

    pub fn bounces(&self) -> u64 {
        self.sessions.values().filter(|s| s.is_bounce()).count() as u64
    }

    /// Landing pages, derived from session entry paths.
    pub fn landing_pages(&self) -> DimMap {
        let mut map = DimMap::new();
        for stat in self.sessions.values() {
            bump(&mut map, &stat.entry_path);
        }
        map
    }

    /// Exit pages, derived from session exit paths.
    pub fn exit_pages(&self) -> DimMap {
        let mut map = DimMap::new();
        for stat in self.sessions.values() {
            bump(&mut map, &stat.exit_path);
        }
        map
    }

    /// Derive the owner-facing summary. Every division guards its
    /// denominator; empty rollups summarise to all zeroes.
    pub fn summary(&self) -> RollupSummary {
        let unique_sessions = self.unique_sessions();
        let bounces = self.bounces();
        let bounce_rate = if unique_sessions == 0 {
            0.0
        } else {
            bounces as f64 / unique_sessions as f64 * 100.0
        };
        let (duration_sum_ms, session_pageviews) = self
            .sessions
            .values()
            .fold((0i64, 0u64), |(dur, pv), s| {
                (dur + s.duration_ms(), pv + s.pageviews)
            });
        let avg_session_duration_secs = if unique_sessions == 0 {
            0.0
        } else {
            duration_sum_ms as f64 / 1000.0 / unique_sessions as f64
        };
        let pages_per_session = if unique_sessions == 0 {
            0.0
        } else {
            session_pageviews as f64 / unique_sessions as f64
        };

        RollupSummary {
            pageviews: self.pageviews,
            custom_events: self.custom_events,
            errors: self.errors,
            unique_visitors: self.unique_visitors(),
            unique_sessions,
            new_visitors: self.new_visitors,
            returning_visitors: self.returning_visitors,
            bounces,
            bounce_rate,
            avg_session_duration_secs,
            pages_per_session,
            avg_time_on_page_ms: self.time_on_page_ms.mean(),
            avg_scroll_depth: self.scroll_depth.mean(),
        }
    }
}

impl Merge for DailyRollup {
    fn merge(&mut self, other: Self) {
        self.pageviews.merge(other.pageviews);
        self.custom_events.merge(other.custom_events);
        self.errors.merge(other.errors);
        self.new_visitors.merge(other.new_visitors);
        self.returning_visitors.merge(other.returning_visitors);
        self.visitors.merge(other.visitors);
        self.sessions.merge(other.sessions);
        self.pages.merge(other.pages);
        self.referrers.merge(other.referrers);
        self.sources.merge(other.sources);
        self.devices.merge(other.devices);
        self.browsers.merge(other.browsers);
        self.operating_systems.merge(other.operating_systems);
        self.screens.merge(other.screens);
        self.languages.merge(other.languages);
        self.countries.merge(other.countries);
        self.cities.merge(other.cities);
        self.campaigns.merge(other.campaigns);
        self.event_names.merge(other.event_names);
        self.error_labels.merge(other.error_labels);
        self.time_on_page_ms.merge(other.time_on_page_ms);
        self.scroll_depth.merge(other.scroll_depth);
    }
}

/// Owner-facing metrics derived from a (possibly merged) rollup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupSummary {
    pub pageviews: u64,
    pub custom_events: u64,
    pub errors: u64,
    pub unique_visitors: u64,
    pub unique_sessions: u64,
    pub new_visitors: u64,
    pub returning_visitors: u64,
    pub bounces: u64,
    /// Percentage in [0, 100].
    pub bounce_rate: f64,
    pub avg_session_duration_secs: f64,
    pub pages_per_session: f64,
    pub avg_time_on_page_ms: f64,
    pub avg_scroll_depth: f64,
}

impl RollupSummary {
    /// Look up a summary metric by its wire name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name {
            "pageviews" => self.pageviews as f64,
            "custom_events" => self.custom_events as f64,
            "errors" => self.errors as f64,
            "unique_visitors" | "visitors" => self.unique_visitors as f64,
            "unique_sessions" | "sessions" => self.unique_sessions as f64,
            "new_visitors" => self.new_visitors as f64,
            "returning_visitors" => self.returning_visitors as f64,
            "bounces" => self.bounces as f64,
            "bounce_rate" => self.bounce_rate,
            "avg_session_duration_secs" => self.avg_session_duration_secs,
            "pages_per_session" => self.pages_per_session,
            "avg_time_on_page_ms" => self.avg_time_on_page_ms,
            "avg_scroll_depth" => self.avg_scroll_depth,
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pageview(path: &str, identity: &str, session: &str, minute: u32) -> Event {
        Event {
            site_id: "s1".to_string(),
            kind: EventKind::Pageview,
            path: path.to_string(),
            referrer_domain: None,
            identity: Some(identity.to_string()),
            session: Some(session.to_string()),
            name: None,
            value: None,
            duration_ms: None,
            click: None,
            scroll: None,
            browser: Some("Chrome".to_string()),
            os: Some("Linux".to_string()),
            device_type: Some("desktop".to_string()),
            screen: None,
            language: None,
            country: Some("DE".to_string()),
            region: None,
            city: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, minute, 0).unwrap(),
        }
    }

    fn custom(name: &str, identity: &str, session: &str, minute: u32) -> Event {
        Event {
            kind: EventKind::Custom,
            name: Some(name.to_string()),
            ..pageview("/", identity, session, minute)
        }
    }

    #[test]
    fn fold_counts_pageviews_and_pages() {
        let mut rollup = DailyRollup::default();
        rollup.fold(&pageview("/", "v1", "sess1", 0), Some(VisitorStatus::New));
        rollup.fold(&pageview("/", "v1", "sess1", 1), None);
        rollup.fold(&pageview("/about", "v2", "sess2", 2), Some(VisitorStatus::Returning));

        assert_eq!(rollup.pageviews, 3);
        assert_eq!(rollup.pages.get("/"), Some(&2));
        assert_eq!(rollup.pages.get("/about"), Some(&1));
        assert_eq!(rollup.unique_visitors(), 2);
        assert_eq!(rollup.unique_sessions(), 2);
        assert_eq!(rollup.new_visitors, 1);
        assert_eq!(rollup.returning_visitors, 1);
    }

    #[test]
    fn fold_order_does_not_matter() {
        let events = vec![
            pageview("/", "v1", "sess1", 0),
            pageview("/pricing", "v1", "sess1", 5),
            custom("signup", "v1", "sess1", 7),
            pageview("/", "v2", "sess2", 3),
            pageview("/about", "v3", "sess3", 9),
        ];

        let mut forward = DailyRollup::default();
        for e in &events {
            forward.fold(e, None);
        }

        let mut reverse = DailyRollup::default();
        for e in events.iter().rev() {
            reverse.fold(e, None);
        }

        assert_eq!(forward, reverse);
    }

    #[test]
    fn partial_rollup_merge_equals_single_fold() {
        let events = vec![
            pageview("/", "v1", "sess1", 0),
            pageview("/pricing", "v1", "sess1", 5),
            pageview("/", "v2", "sess2", 3),
            custom("signup", "v2", "sess2", 4),
        ];

        let mut whole = DailyRollup::default();
        for e in &events {
            whole.fold(e, None);
        }

        // Two writers each fold a disjoint half, then the halves merge.
        let mut left = DailyRollup::default();
        left.fold(&events[0], None);
        left.fold(&events[1], None);
        let mut right = DailyRollup::default();
        right.fold(&events[2], None);
        right.fold(&events[3], None);
        left.merge(right);

        assert_eq!(whole, left);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = DailyRollup::default();
        a.fold(&pageview("/", "v1", "sess1", 0), None);
        let mut b = DailyRollup::default();
        b.fold(&pageview("/x", "v2", "sess2", 1), None);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab, ba);
    }

    #[test]
    fn bounce_requires_single_pageview_and_no_engagement() {
        let mut rollup = DailyRollup::default();
        // sess1: one pageview, nothing else — bounce.
        rollup.fold(&pageview("/", "v1", "sess1", 0), None);
        // sess2: one pageview plus a custom event — not a bounce.
        rollup.fold(&pageview("/", "v2", "sess2", 1), None);
        rollup.fold(&custom("signup", "v2", "sess2", 2), None);
        // sess3: two pageviews — not a bounce.
        rollup.fold(&pageview("/", "v3", "sess3", 3), None);
        rollup.fold(&pageview("/about", "v3", "sess3", 4), None);

        assert_eq!(rollup.bounces(), 1);
        let summary = rollup.summary();
        assert!((summary.bounce_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn summary_guards_zero_denominators() {
        let summary = DailyRollup::default().summary();
        assert_eq!(summary.bounce_rate, 0.0);
        assert_eq!(summary.avg_session_duration_secs, 0.0);
        assert_eq!(summary.pages_per_session, 0.0);
        assert_eq!(summary.avg_time_on_page_ms, 0.0);
        assert!(summary.bounce_rate >= 0.0 && summary.bounce_rate <= 100.0);
    }

    #[test]
    fn landing_and_exit_pages_follow_session_timestamps() {
        let mut rollup = DailyRollup::default();
        rollup.fold(&pageview("/landing", "v1", "sess1", 0), None);
        rollup.fold(&pageview("/middle", "v1", "sess1", 5), None);
        rollup.fold(&pageview("/exit", "v1", "sess1", 10), None);

        assert_eq!(rollup.landing_pages().get("/landing"), Some(&1));
        assert_eq!(rollup.exit_pages().get("/exit"), Some(&1));
    }

    #[test]
    fn session_duration_derived_from_first_and_last_seen() {
        let mut rollup = DailyRollup::default();
        rollup.fold(&pageview("/", "v1", "sess1", 0), None);
        rollup.fold(&pageview("/about", "v1", "sess1", 10), None);

        let summary = rollup.summary();
        assert!((summary.avg_session_duration_secs - 600.0).abs() < 1e-9);
        assert!((summary.pages_per_session - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sum_count_mean_zero_when_empty() {
        assert_eq!(SumCount::default().mean(), 0.0);
        let mut sc = SumCount::default();
        sc.record(10.0);
        sc.record(20.0);
        assert!((sc.mean() - 15.0).abs() < 1e-9);
    }
}
