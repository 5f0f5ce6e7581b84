//! Shared query-string handling for range-scoped endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use lumen_core::period::{self, DateRange};
use lumen_engine::range::{BreakdownProperty, Filter};

use crate::error::AppError;

/// Query parameters accepted by every range-scoped endpoint. Each
/// `filter_*` parameter narrows one dimension (exact value, or a trailing
/// `/*` for prefix matching); filters combine with AND.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub property: Option<String>,
    pub path: Option<String>,
    pub filter_page: Option<String>,
    pub filter_referrer: Option<String>,
    pub filter_source: Option<String>,
    pub filter_device: Option<String>,
    pub filter_browser: Option<String>,
    pub filter_os: Option<String>,
    pub filter_country: Option<String>,
    pub filter_city: Option<String>,
    pub filter_language: Option<String>,
    pub filter_screen: Option<String>,
    pub filter_campaign: Option<String>,
    pub filter_landing_page: Option<String>,
    pub filter_exit_page: Option<String>,
}

impl RangeParams {
    /// Resolve the period token (default `7d`) against `now`.
    pub fn resolve_range(&self, now: DateTime<Utc>) -> Result<DateRange, AppError> {
        let token = self.period.as_deref().unwrap_or("7d");
        period::resolve(token, self.start_date, self.end_date, now)
            .map_err(|e| AppError::BadRequest(e.to_string()))
    }

    pub fn filters(&self) -> Vec<Filter> {
        let pairs = [
            (BreakdownProperty::Page, &self.filter_page),
            (BreakdownProperty::Referrer, &self.filter_referrer),
            (BreakdownProperty::Source, &self.filter_source),
            (BreakdownProperty::Device, &self.filter_device),
            (BreakdownProperty::Browser, &self.filter_browser),
            (BreakdownProperty::Os, &self.filter_os),
            (BreakdownProperty::Country, &self.filter_country),
            (BreakdownProperty::City, &self.filter_city),
            (BreakdownProperty::Language, &self.filter_language),
            (BreakdownProperty::Screen, &self.filter_screen),
            (BreakdownProperty::Campaign, &self.filter_campaign),
            (BreakdownProperty::LandingPage, &self.filter_landing_page),
            (BreakdownProperty::ExitPage, &self.filter_exit_page),
        ];
        pairs
            .into_iter()
            .filter_map(|(property, pattern)| {
                pattern.as_ref().map(|pattern| Filter {
                    property,
                    pattern: pattern.clone(),
                })
            })
            .collect()
    }
}
