//! The ingestion fold pipeline.
//!
//! One validated event fans out into up to four store writes: the daily
//! rollup, the realtime window, a heatmap bucket (clicks/scrolls), and the
//! per-session activity sequence (pageviews/custom events). Each write is
//! an independent read-modify-write; none of them assumes atomicity at the
//! store layer, and the engine performs no internal retries — replaying a
//! failed fold from the caller is safe because every combine is additive.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use lumen_core::event::{Event, EventKind};
use lumen_core::rollup::{DailyRollup, VisitorStatus};
use lumen_store::{keys, KvStore, KvStoreExt};

use crate::funnel::{ActivityEntry, ActivityKind, ActivityMap};
use crate::Engine;

impl Engine {
    /// Fold one validated event into all per-day aggregates.
    pub async fn ingest(&self, event: &Event) -> Result<()> {
        let date = event.created_at.date_naive();

        let status = match event.identity.as_deref() {
            Some(identity) => self.visitor_status(&event.site_id, identity, date).await,
            None => None,
        };

        let rollup_key = keys::rollup(&event.site_id, date);
        self.read_modify_write(&rollup_key, |rollup: &mut DailyRollup| {
            rollup.fold(event, status);
        })
        .await
        .context("rollup fold")?;

        if let Some(session) = event.session.as_deref() {
            self.touch_realtime(&event.site_id, session, &event.path, event.created_at)
                .await
                .context("realtime heartbeat")?;
            self.append_activity(event, session, date)
                .await
                .context("activity append")?;
        }

        match event.kind {
            EventKind::Click => {
                if let Some(click) = &event.click {
                    self.record_click(&event.site_id, &event.path, date, click)
                        .await
                        .context("click heatmap")?;
                }
            }
            EventKind::Scroll => {
                if let Some(scroll) = &event.scroll {
                    self.record_scroll(
                        &event.site_id,
                        &event.path,
                        date,
                        event.session.as_deref(),
                        scroll,
                    )
                    .await
                    .context("scroll heatmap")?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Generic commutative read-modify-write against one store key.
    pub(crate) async fn read_modify_write<T, F>(&self, key: &str, apply: F) -> Result<()>
    where
        T: Default + Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&mut T),
    {
        let mut value: T = self.store.get_json(key).await?.unwrap_or_default();
        apply(&mut value);
        self.store.set_json(key, &value).await
    }

    /// New-vs-returning classification via the cross-day first-seen marker.
    ///
    /// Marker failures degrade to `None` (unclassified) — the event still
    /// folds, only the new/returning split loses it.
    async fn visitor_status(
        &self,
        site_id: &str,
        identity: &str,
        today: NaiveDate,
    ) -> Option<VisitorStatus> {
        let key = keys::seen_marker(site_id, identity);
        let marker = match self.store.get(&key).await {
            Ok(marker) => marker,
            Err(error) => {
                warn!(%error, "seen-marker read failed; visitor unclassified");
                return None;
            }
        };

        let last_seen = marker.and_then(|raw| raw.parse::<NaiveDate>().ok());
        let retention = chrono::Duration::days(self.config.visitor_retention_days as i64);
        let status = match last_seen {
            Some(seen) if seen < today && today - seen <= retention => VisitorStatus::Returning,
            // Absent, expired, or first seen today: a new visitor.
            _ => VisitorStatus::New,
        };

        // Refresh the marker at most once per day.
        if last_seen.map_or(true, |seen| seen < today) {
            if let Err(error) = self.store.set(&key, &today.to_string()).await {
                warn!(%error, "seen-marker write failed");
            }
        }

        Some(status)
    }

    /// Append the event to the session's activity sequence, capped per
    /// session. Only pageviews and named custom events participate —
    /// they are the only things funnel steps can match.
    async fn append_activity(&self, event: &Event, session: &str, date: NaiveDate) -> Result<()> {
        let entry = match event.kind {
            EventKind::Pageview => ActivityEntry {
                kind: ActivityKind::Page,
                value: event.path.clone(),
                at_ms: event.created_at.timestamp_millis(),
            },
            EventKind::Custom => match event.name.as_deref() {
                Some(name) => ActivityEntry {
                    kind: ActivityKind::Event,
                    value: name.to_string(),
                    at_ms: event.created_at.timestamp_millis(),
                },
                None => return Ok(()),
            },
            _ => return Ok(()),
        };

        let cap = self.config.activity_entry_cap;
        let key = keys::activity(&event.site_id, date);
        self.read_modify_write(&key, |activity: &mut ActivityMap| {
            let entries = activity.entry(session.to_string()).or_default();
            // Keep the head of the sequence: funnel matching walks from
            // the session start, so the earliest entries carry the signal.
            if entries.len() < cap {
                entries.push(entry);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use lumen_core::config::Config;
    use lumen_core::event::{Event, EventKind};
    use lumen_core::rollup::DailyRollup;
    use lumen_store::{KvStoreExt, MemoryStore};

    use crate::Engine;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryStore::new()), Config::default())
    }

    fn pageview(site: &str, path: &str, identity: &str, session: &str, minute: u32) -> Event {
        Event {
            site_id: site.to_string(),
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
            browser: None,
            os: None,
            device_type: None,
            screen: None,
            language: None,
            country: None,
            region: None,
            city: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn ingest_builds_the_daily_rollup() {
        let engine = engine();
        engine.ingest(&pageview("S", "/", "v1", "sess1", 0)).await.unwrap();
        engine.ingest(&pageview("S", "/", "v1", "sess1", 1)).await.unwrap();
        engine.ingest(&pageview("S", "/about", "v2", "sess2", 2)).await.unwrap();

        let rollup: DailyRollup = engine
            .store()
            .get_json("S:2024-01-15")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.pageviews, 3);
        assert_eq!(rollup.pages.get("/"), Some(&2));
        assert_eq!(rollup.pages.get("/about"), Some(&1));
        assert_eq!(rollup.unique_visitors(), 2);
    }

    #[tokio::test]
    async fn first_visit_classifies_new_then_returning_next_day() {
        let engine = engine();
        engine.ingest(&pageview("S", "/", "v1", "sess1", 0)).await.unwrap();

        let rollup: DailyRollup = engine
            .store()
            .get_json("S:2024-01-15")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.new_visitors, 1);
        assert_eq!(rollup.returning_visitors, 0);

        // Same identity hash appearing the next day.
        let mut next_day = pageview("S", "/", "v1", "sess9", 0);
        next_day.created_at = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap();
        engine.ingest(&next_day).await.unwrap();

        let rollup: DailyRollup = engine
            .store()
            .get_json("S:2024-01-16")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.returning_visitors, 1);
    }

    #[tokio::test]
    async fn repeat_visits_same_day_stay_one_new_visitor() {
        let engine = engine();
        engine.ingest(&pageview("S", "/", "v1", "sess1", 0)).await.unwrap();
        engine.ingest(&pageview("S", "/a", "v1", "sess1", 1)).await.unwrap();

        let rollup: DailyRollup = engine
            .store()
            .get_json("S:2024-01-15")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.new_visitors, 1);
        assert_eq!(rollup.returning_visitors, 0);
    }

    #[tokio::test]
    async fn unattributed_events_still_count() {
        let engine = engine();
        let mut event = pageview("S", "/", "v1", "sess1", 0);
        event.identity = None;
        event.session = None;
        engine.ingest(&event).await.unwrap();

        let rollup: DailyRollup = engine
            .store()
            .get_json("S:2024-01-15")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.pageviews, 1);
        assert_eq!(rollup.unique_visitors(), 0);
        assert_eq!(rollup.unique_sessions(), 0);
    }
}
