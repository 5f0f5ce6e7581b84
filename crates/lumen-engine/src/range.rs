//! Range-query aggregation.
//!
//! Queries fan out one store read per date bucket, merge the daily rollups
//! with the same associative operators ingestion uses, and only then derive
//! dependent metrics. Filters narrow a dimension before anything is
//! summed; breakdowns emit one row per distinct key of the requested
//! dimension.

use anyhow::{anyhow, Result};
use serde::Serialize;

use lumen_core::period::DateRange;
use lumen_core::rollup::{DailyRollup, DimMap, Merge, RollupSummary};
use lumen_store::{keys, KvStoreExt};

use crate::Engine;

/// Dimensions a breakdown or filter can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownProperty {
    Page,
    Referrer,
    Source,
    Device,
    Browser,
    Os,
    Country,
    City,
    Language,
    Screen,
    Campaign,
    EventName,
    ErrorLabel,
    LandingPage,
    ExitPage,
}

pub const VALID_BREAKDOWN_PROPERTIES: &[&str] = &[
    "page",
    "referrer",
    "source",
    "device",
    "browser",
    "os",
    "country",
    "city",
    "language",
    "screen",
    "campaign",
    "event_name",
    "error_label",
    "landing_page",
    "exit_page",
];

impl BreakdownProperty {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(match raw.trim() {
            "page" => Self::Page,
            "referrer" => Self::Referrer,
            "source" => Self::Source,
            "device" => Self::Device,
            "browser" => Self::Browser,
            "os" => Self::Os,
            "country" => Self::Country,
            "city" => Self::City,
            "language" => Self::Language,
            "screen" => Self::Screen,
            "campaign" => Self::Campaign,
            "event_name" => Self::EventName,
            "error_label" => Self::ErrorLabel,
            "landing_page" => Self::LandingPage,
            "exit_page" => Self::ExitPage,
            other => {
                return Err(anyhow!(
                    "property must be one of: {} (got {other:?})",
                    VALID_BREAKDOWN_PROPERTIES.join(", ")
                ))
            }
        })
    }
}

/// An exact-or-wildcard dimension filter. Multiple filters AND together.
#[derive(Debug, Clone)]
pub struct Filter {
    pub property: BreakdownProperty,
    pub pattern: String,
}

/// Exact match, or prefix match when the pattern ends in `/*`.
fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(prefix) => key == prefix || key.starts_with(&format!("{prefix}/")),
        None => key == pattern,
    }
}

fn retain_matching(map: &mut DimMap, pattern: &str) {
    map.retain(|key, _| key_matches(pattern, key));
}

/// Narrow the rollup to the filtered slice of each addressed dimension.
///
/// Landing/exit filters narrow the session map itself (and with it every
/// session-derived metric); a page filter re-derives the pageview total
/// from the surviving page entries. Counters outside the filtered
/// dimension keep their site-wide values — a rollup cannot be re-sliced
/// along a dimension it never stored raw events for.
fn apply_filters(rollup: &mut DailyRollup, filters: &[Filter]) {
    for filter in filters {
        let pattern = filter.pattern.as_str();
        match filter.property {
            BreakdownProperty::Page => {
                retain_matching(&mut rollup.pages, pattern);
                rollup.pageviews = rollup.pages.values().sum();
            }
            BreakdownProperty::Referrer => retain_matching(&mut rollup.referrers, pattern),
            BreakdownProperty::Source => retain_matching(&mut rollup.sources, pattern),
            BreakdownProperty::Device => retain_matching(&mut rollup.devices, pattern),
            BreakdownProperty::Browser => retain_matching(&mut rollup.browsers, pattern),
            BreakdownProperty::Os => retain_matching(&mut rollup.operating_systems, pattern),
            BreakdownProperty::Country => retain_matching(&mut rollup.countries, pattern),
            BreakdownProperty::City => retain_matching(&mut rollup.cities, pattern),
            BreakdownProperty::Language => retain_matching(&mut rollup.languages, pattern),
            BreakdownProperty::Screen => retain_matching(&mut rollup.screens, pattern),
            BreakdownProperty::Campaign => retain_matching(&mut rollup.campaigns, pattern),
            BreakdownProperty::EventName => retain_matching(&mut rollup.event_names, pattern),
            BreakdownProperty::ErrorLabel => retain_matching(&mut rollup.error_labels, pattern),
            BreakdownProperty::LandingPage => rollup
                .sessions
                .retain(|_, stat| key_matches(pattern, &stat.entry_path)),
            BreakdownProperty::ExitPage => rollup
                .sessions
                .retain(|_, stat| key_matches(pattern, &stat.exit_path)),
        }
    }
}

fn dimension_map(rollup: &DailyRollup, property: BreakdownProperty) -> DimMap {
    match property {
        BreakdownProperty::Page => rollup.pages.clone(),
        BreakdownProperty::Referrer => rollup.referrers.clone(),
        BreakdownProperty::Source => rollup.sources.clone(),
        BreakdownProperty::Device => rollup.devices.clone(),
        BreakdownProperty::Browser => rollup.browsers.clone(),
        BreakdownProperty::Os => rollup.operating_systems.clone(),
        BreakdownProperty::Country => rollup.countries.clone(),
        BreakdownProperty::City => rollup.cities.clone(),
        BreakdownProperty::Language => rollup.languages.clone(),
        BreakdownProperty::Screen => rollup.screens.clone(),
        BreakdownProperty::Campaign => rollup.campaigns.clone(),
        BreakdownProperty::EventName => rollup.event_names.clone(),
        BreakdownProperty::ErrorLabel => rollup.error_labels.clone(),
        BreakdownProperty::LandingPage => rollup.landing_pages(),
        BreakdownProperty::ExitPage => rollup.exit_pages(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownRow {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub range: DateRange,
    #[serde(flatten)]
    pub summary: RollupSummary,
}

impl Engine {
    /// Merge every daily rollup in the range into one. Missing days
    /// contribute nothing.
    pub async fn combined_rollup(&self, site_id: &str, range: DateRange) -> Result<DailyRollup> {
        let mut combined = DailyRollup::default();
        for date in range.dates() {
            let key = keys::rollup(site_id, date);
            if let Some(rollup) = self.store.get_json::<DailyRollup>(&key).await? {
                combined.merge(rollup);
            }
        }
        Ok(combined)
    }

    /// Summary metrics for the range, after filters.
    pub async fn stats(
        &self,
        site_id: &str,
        range: DateRange,
        filters: &[Filter],
    ) -> Result<StatsResult> {
        let mut rollup = self.combined_rollup(site_id, range).await?;
        apply_filters(&mut rollup, filters);
        Ok(StatsResult {
            range,
            summary: rollup.summary(),
        })
    }

    /// One row per distinct key of `property`, sorted descending by count,
    /// ties broken by key lexical order.
    pub async fn breakdown(
        &self,
        site_id: &str,
        range: DateRange,
        property: BreakdownProperty,
        filters: &[Filter],
    ) -> Result<Vec<BreakdownRow>> {
        let mut rollup = self.combined_rollup(site_id, range).await?;
        apply_filters(&mut rollup, filters);

        let mut rows: Vec<BreakdownRow> = dimension_map(&rollup, property)
            .into_iter()
            .map(|(key, count)| BreakdownRow { key, count })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        Ok(rows)
    }
}
