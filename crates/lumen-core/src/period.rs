use anyhow::{anyhow, Result};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;

/// An inclusive range of UTC dates, one rollup bucket per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterate the dates in the range, oldest first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let mut current = Some(self.start);
        let end = self.end;
        std::iter::from_fn(move || {
            let date = current?;
            if date > end {
                return None;
            }
            current = date.succ_opt();
            Some(date)
        })
    }
}

/// Resolve a period token against `now`, at UTC day boundaries.
///
/// `custom` requires both `start` and `end`; every other token ignores
/// them. `realtime` resolves to today only — the caller combines it with
/// the active-visitor window rather than historical rollups.
pub fn resolve(
    token: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<DateRange> {
    let today = now.date_naive();
    let days_back = |n: i64| DateRange {
        start: today - chrono::Duration::days(n - 1),
        end: today,
    };
    match token.trim() {
        "24h" => Ok(days_back(2)),
        "7d" => Ok(days_back(7)),
        "30d" => Ok(days_back(30)),
        "90d" => Ok(days_back(90)),
        "365d" => Ok(days_back(365)),
        "6mo" => Ok(DateRange {
            start: today
                .checked_sub_months(Months::new(6))
                .ok_or_else(|| anyhow!("period out of range"))?,
            end: today,
        }),
        "12mo" => Ok(DateRange {
            start: today
                .checked_sub_months(Months::new(12))
                .ok_or_else(|| anyhow!("period out of range"))?,
            end: today,
        }),
        "realtime" => Ok(DateRange::single(today)),
        "custom" => {
            let start = start.ok_or_else(|| anyhow!("start_date is required for custom period"))?;
            let end = end.ok_or_else(|| anyhow!("end_date is required for custom period"))?;
            if end < start {
                return Err(anyhow!("end_date must be on or after start_date"));
            }
            Ok(DateRange { start, end })
        }
        other => Err(anyhow!(
            "period must be one of: 24h, 7d, 30d, 90d, 365d, 6mo, 12mo, realtime, custom (got {other:?})"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn seven_days_spans_seven_buckets() {
        let range = resolve("7d", None, None, now()).unwrap();
        assert_eq!(range.start, d(2024, 3, 9));
        assert_eq!(range.end, d(2024, 3, 15));
        assert_eq!(range.num_days(), 7);
    }

    #[test]
    fn twenty_four_hours_spans_two_day_buckets() {
        let range = resolve("24h", None, None, now()).unwrap();
        assert_eq!(range.start, d(2024, 3, 14));
        assert_eq!(range.end, d(2024, 3, 15));
    }

    #[test]
    fn six_months_uses_calendar_months() {
        let range = resolve("6mo", None, None, now()).unwrap();
        assert_eq!(range.start, d(2023, 9, 15));
    }

    #[test]
    fn custom_requires_both_bounds() {
        assert!(resolve("custom", Some(d(2024, 1, 1)), None, now()).is_err());
        assert!(resolve("custom", None, Some(d(2024, 1, 2)), now()).is_err());
        let range = resolve("custom", Some(d(2024, 1, 1)), Some(d(2024, 1, 2)), now()).unwrap();
        assert_eq!(range.num_days(), 2);
    }

    #[test]
    fn custom_rejects_inverted_range() {
        assert!(resolve("custom", Some(d(2024, 1, 2)), Some(d(2024, 1, 1)), now()).is_err());
    }

    #[test]
    fn unknown_token_is_an_error() {
        assert!(resolve("14d", None, None, now()).is_err());
        assert!(resolve("", None, None, now()).is_err());
    }

    #[test]
    fn dates_iterates_inclusive() {
        let range = DateRange {
            start: d(2024, 1, 1),
            end: d(2024, 1, 3),
        };
        let dates: Vec<_> = range.dates().collect();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
    }
}
