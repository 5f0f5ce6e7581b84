//! Funnel definitions and evaluation.
//!
//! A funnel is an ordered list of 2–10 steps, each matching either a page
//! path or a custom event name. Evaluation is a single-pass state machine
//! per session over its chronological activity sequence: the state is the
//! last matched step index, advancing on the first event that satisfies
//! the next step's predicate. Steps must occur in order but need not be
//! contiguous — unrelated intervening events are skipped, never
//! disqualifying.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use lumen_core::period::DateRange;
use lumen_store::{keys, KvStore, KvStoreExt};

use crate::Engine;

pub const MIN_FUNNEL_STEPS: usize = 2;
pub const MAX_FUNNEL_STEPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Page,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    #[default]
    Equals,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStep {
    pub step_type: StepType,
    pub match_value: String,
    #[serde(default)]
    pub match_operator: MatchOperator,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub id: String,
    pub site_id: String,
    pub name: String,
    pub steps: Vec<FunnelStep>,
    pub created_at: String,
}

/// What a session did, as recorded at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Page,
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub value: String,
    pub at_ms: i64,
}

/// Session hash → chronological activity, one object per (site, day).
pub type ActivityMap = BTreeMap<String, Vec<ActivityEntry>>;

fn step_matches(step: &FunnelStep, entry: &ActivityEntry) -> bool {
    let kind_matches = matches!(
        (step.step_type, entry.kind),
        (StepType::Page, ActivityKind::Page) | (StepType::Event, ActivityKind::Event)
    );
    if !kind_matches {
        return false;
    }
    match step.match_operator {
        MatchOperator::Equals => entry.value == step.match_value,
        MatchOperator::Contains => entry.value.contains(&step.match_value),
    }
}

/// Number of steps a session's ordered activity satisfies, in order.
fn steps_reached(steps: &[FunnelStep], entries: &[ActivityEntry]) -> usize {
    let mut matched = 0;
    for entry in entries {
        if matched == steps.len() {
            break;
        }
        if step_matches(&steps[matched], entry) {
            matched += 1;
        }
    }
    matched
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelStepCount {
    pub index: usize,
    pub label: String,
    /// Sessions whose highest contiguous step index reached at least here.
    pub sessions: u64,
    /// Percentage of step-0 sessions, in [0, 100].
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelResults {
    pub funnel_id: String,
    pub name: String,
    pub total_entered: u64,
    pub steps: Vec<FunnelStepCount>,
}

/// Compute per-step counts from per-session reach depths.
fn compute_results(funnel: &FunnelDefinition, reach: &[usize]) -> FunnelResults {
    let mut counts = vec![0u64; funnel.steps.len()];
    for &reached in reach {
        for count in counts.iter_mut().take(reached) {
            *count += 1;
        }
    }

    let entered = counts.first().copied().unwrap_or(0);
    let steps = funnel
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| FunnelStepCount {
            index,
            label: step.label.clone(),
            sessions: counts[index],
            conversion_rate: if entered == 0 {
                0.0
            } else {
                counts[index] as f64 / entered as f64 * 100.0
            },
        })
        .collect();

    FunnelResults {
        funnel_id: funnel.id.clone(),
        name: funnel.name.clone(),
        total_entered: entered,
        steps,
    }
}

/// Definition-time step-count bounds. Evaluation never re-checks them.
pub fn validate_steps(steps: &[FunnelStep]) -> Result<()> {
    if steps.len() < MIN_FUNNEL_STEPS {
        return Err(anyhow!("a funnel requires at least {MIN_FUNNEL_STEPS} steps"));
    }
    if steps.len() > MAX_FUNNEL_STEPS {
        return Err(anyhow!("a funnel allows at most {MAX_FUNNEL_STEPS} steps"));
    }
    Ok(())
}

impl Engine {
    /// Create and persist a funnel. Step-count bounds are enforced here,
    /// at definition time — evaluation never re-checks them.
    pub async fn create_funnel(
        &self,
        site_id: &str,
        name: &str,
        steps: Vec<FunnelStep>,
    ) -> Result<FunnelDefinition> {
        validate_steps(&steps)?;
        let funnel = FunnelDefinition {
            id: format!("fnl_{}", uuid::Uuid::new_v4().simple()),
            site_id: site_id.to_string(),
            name: name.to_string(),
            steps,
            created_at: Utc::now().to_rfc3339(),
        };
        self.store
            .set_json(&keys::funnel(site_id, &funnel.id), &funnel)
            .await?;
        Ok(funnel)
    }

    pub async fn list_funnels(&self, site_id: &str) -> Result<Vec<FunnelDefinition>> {
        let mut funnels = Vec::new();
        for key in self.store.list(&keys::funnel_prefix(site_id)).await? {
            if let Some(funnel) = self.store.get_json::<FunnelDefinition>(&key).await? {
                funnels.push(funnel);
            }
        }
        Ok(funnels)
    }

    pub async fn get_funnel(
        &self,
        site_id: &str,
        funnel_id: &str,
    ) -> Result<Option<FunnelDefinition>> {
        self.store
            .get_json(&keys::funnel(site_id, funnel_id))
            .await
    }

    pub async fn delete_funnel(&self, site_id: &str, funnel_id: &str) -> Result<bool> {
        let key = keys::funnel(site_id, funnel_id);
        let existed = self.store.get(&key).await?.is_some();
        if existed {
            self.store.delete(&key).await?;
        }
        Ok(existed)
    }

    /// Evaluate the funnel against every session observed in the range.
    pub async fn funnel_results(
        &self,
        funnel: &FunnelDefinition,
        range: DateRange,
    ) -> Result<FunnelResults> {
        let mut reach = Vec::new();
        for date in range.dates() {
            let key = keys::activity(&funnel.site_id, date);
            let Some(activity) = self.store.get_json::<ActivityMap>(&key).await? else {
                continue;
            };
            for mut entries in activity.into_values() {
                // Entries append in arrival order; racing writers can
                // interleave, so restore timestamp order before matching.
                entries.sort_by_key(|e| e.at_ms);
                reach.push(steps_reached(&funnel.steps, &entries));
            }
        }
        Ok(compute_results(funnel, &reach))
    }
}
