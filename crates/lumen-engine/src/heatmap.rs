//! Heatmap density aggregation.
//!
//! Click and scroll activity accumulates into per (site, page, day)
//! buckets. Click buckets keep a bounded raw-point list plus a 5%-cell
//! density grid; once the point cap is reached new points land directly in
//! the grid, so density is always derivable from stored state without
//! re-reading original events. Scroll buckets keep a 10-band depth
//! histogram, per-session max depths, and a running fold-line accumulator.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use lumen_core::event::{ClickPayload, ScrollPayload};
use lumen_core::period::DateRange;
use lumen_core::rollup::{DimMap, Merge, SumCount};
use lumen_store::{keys, KvStoreExt};

use crate::Engine;

/// Side length of a density-grid cell, in percent of page dimensions.
const GRID_CELL_PERCENT: f64 = 5.0;
/// Number of 10%-wide scroll depth bands.
const DEPTH_BANDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickPoint {
    pub x_percent: f64,
    pub y_percent: f64,
    pub element: Option<String>,
    /// Viewport bucket, e.g. "1920x1080".
    pub viewport: String,
}

/// One click bucket per (site, page, day).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickBucket {
    pub total_clicks: u64,
    pub points: Vec<ClickPoint>,
    /// Density cells keyed "xCell,yCell"; holds clicks beyond the raw
    /// point cap.
    pub grid: DimMap,
    pub viewports: DimMap,
}

fn grid_cell(x_percent: f64, y_percent: f64) -> String {
    let clamp = |v: f64| v.clamp(0.0, 100.0);
    let cell = |v: f64| (clamp(v) / GRID_CELL_PERCENT).floor() as u32;
    format!("{},{}", cell(x_percent), cell(y_percent))
}

impl ClickBucket {
    fn record(&mut self, click: &ClickPayload, point_cap: usize) {
        self.total_clicks += 1;
        let viewport = format!("{}x{}", click.viewport_width, click.viewport_height);
        *self.viewports.entry(viewport.clone()).or_insert(0) += 1;

        if self.points.len() < point_cap {
            self.points.push(ClickPoint {
                x_percent: click.x_percent,
                y_percent: click.y_percent,
                element: click.element.clone(),
                viewport,
            });
        } else {
            *self
                .grid
                .entry(grid_cell(click.x_percent, click.y_percent))
                .or_insert(0) += 1;
        }
    }

    /// Full density: the summarized grid plus the raw points bucketed into
    /// the same cells.
    pub fn density(&self) -> DimMap {
        let mut grid = self.grid.clone();
        for point in &self.points {
            *grid
                .entry(grid_cell(point.x_percent, point.y_percent))
                .or_insert(0) += 1;
        }
        grid
    }
}

impl Merge for ClickBucket {
    fn merge(&mut self, other: Self) {
        self.total_clicks += other.total_clicks;
        self.points.extend(other.points);
        self.grid.merge(other.grid);
        self.viewports.merge(other.viewports);
    }
}

/// One scroll bucket per (site, page, day).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollBucket {
    /// 10%-wide depth bands; index 0 = 0–10%, index 9 = 90–100%.
    pub bands: Vec<u64>,
    /// Session hash → maximum depth observed for that session.
    pub session_depths: BTreeMap<String, f64>,
    pub fold_position: SumCount,
}

fn depth_band(depth_percent: f64) -> usize {
    ((depth_percent.clamp(0.0, 100.0) / 10.0) as usize).min(DEPTH_BANDS - 1)
}

impl ScrollBucket {
    fn record(&mut self, session: Option<&str>, scroll: &ScrollPayload, sample_cap: usize) {
        if self.bands.len() < DEPTH_BANDS {
            self.bands.resize(DEPTH_BANDS, 0);
        }
        self.bands[depth_band(scroll.max_depth_percent)] += 1;

        if let Some(session) = session {
            let session_count = self.session_depths.len();
            match self.session_depths.get_mut(session) {
                Some(depth) => *depth = depth.max(scroll.max_depth_percent),
                None if session_count < sample_cap => {
                    self.session_depths
                        .insert(session.to_string(), scroll.max_depth_percent);
                }
                None => {}
            }
        }

        if let Some(fold) = scroll.fold_position_percent {
            self.fold_position.record(fold);
        }
    }

    pub fn session_count(&self) -> u64 {
        self.session_depths.len() as u64
    }
}

impl Merge for ScrollBucket {
    fn merge(&mut self, other: Self) {
        if self.bands.len() < DEPTH_BANDS {
            self.bands.resize(DEPTH_BANDS, 0);
        }
        for (idx, count) in other.bands.into_iter().enumerate().take(DEPTH_BANDS) {
            self.bands[idx] += count;
        }
        for (session, depth) in other.session_depths {
            self.session_depths
                .entry(session)
                .and_modify(|d| *d = d.max(depth))
                .or_insert(depth);
        }
        self.fold_position.merge(other.fold_position);
    }
}

/// Scroll density as reported to the owner.
#[derive(Debug, Clone, Serialize)]
pub struct ScrollDensity {
    pub bands: Vec<u64>,
    pub session_count: u64,
    pub avg_fold_position: f64,
    pub avg_max_depth: f64,
}

impl Engine {
    pub async fn record_click(
        &self,
        site_id: &str,
        path: &str,
        date: NaiveDate,
        click: &ClickPayload,
    ) -> Result<()> {
        let cap = self.config.heatmap_point_cap;
        let key = keys::heatmap_click(site_id, date, path);
        self.read_modify_write(&key, |bucket: &mut ClickBucket| {
            bucket.record(click, cap);
        })
        .await
    }

    pub async fn record_scroll(
        &self,
        site_id: &str,
        path: &str,
        date: NaiveDate,
        session: Option<&str>,
        scroll: &ScrollPayload,
    ) -> Result<()> {
        let cap = self.config.heatmap_sample_cap;
        let key = keys::heatmap_scroll(site_id, date, path);
        self.read_modify_write(&key, |bucket: &mut ScrollBucket| {
            bucket.record(session, scroll, cap);
        })
        .await
    }

    /// Merge the page's click buckets across the range.
    pub async fn query_clicks(
        &self,
        site_id: &str,
        path: &str,
        range: DateRange,
    ) -> Result<ClickBucket> {
        let mut combined = ClickBucket::default();
        for date in range.dates() {
            let key = keys::heatmap_click(site_id, date, path);
            if let Some(bucket) = self.store.get_json::<ClickBucket>(&key).await? {
                combined.merge(bucket);
            }
        }
        Ok(combined)
    }

    /// Merge the page's scroll buckets across the range.
    pub async fn query_scroll(
        &self,
        site_id: &str,
        path: &str,
        range: DateRange,
    ) -> Result<ScrollDensity> {
        let mut combined = ScrollBucket::default();
        for date in range.dates() {
            let key = keys::heatmap_scroll(site_id, date, path);
            if let Some(bucket) = self.store.get_json::<ScrollBucket>(&key).await? {
                combined.merge(bucket);
            }
        }

        let mut bands = combined.bands.clone();
        bands.resize(DEPTH_BANDS, 0);
        let session_count = combined.session_count();
        let avg_max_depth = if session_count == 0 {
            0.0
        } else {
            combined.session_depths.values().sum::<f64>() / session_count as f64
        };

        Ok(ScrollDensity {
            bands,
            session_count,
            avg_fold_position: combined.fold_position.mean(),
            avg_max_depth,
        })
    }
}
