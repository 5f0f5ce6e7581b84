//! Goal definitions and evaluation.
//!
//! A goal compares one aggregated metric for a period against a numeric
//! target with a `gte` or `lte` comparator. Evaluation is read-only: it
//! pulls the metric from the range aggregator and derives completion and
//! progress; nothing about a goal is written at evaluation time.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumen_core::period;
use lumen_core::rollup::DailyRollup;
use lumen_store::{keys, KvStore, KvStoreExt};

use crate::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gte,
    Lte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub site_id: String,
    pub name: String,
    /// Wire name of a summary metric, e.g. "pageviews" or "bounce_rate".
    pub metric: String,
    pub target: f64,
    pub comparator: Comparator,
    /// Period token the goal is evaluated over, e.g. "30d".
    pub period: String,
    pub notify: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalProgress {
    pub goal_id: String,
    pub current_value: f64,
    pub target: f64,
    /// Percentage in [0, 100].
    pub progress_percent: f64,
    pub is_complete: bool,
}

/// Pure comparator evaluation against an already-aggregated value.
pub fn evaluate(goal: &Goal, current_value: f64) -> GoalProgress {
    let (is_complete, progress_percent) = match goal.comparator {
        Comparator::Gte => (
            current_value >= goal.target,
            (current_value / goal.target * 100.0).min(100.0),
        ),
        Comparator::Lte => (
            current_value <= goal.target,
            if current_value <= goal.target {
                100.0
            } else {
                // Progress reflects distance below target, shrinking as
                // the value exceeds it.
                (goal.target / current_value * 100.0).min(100.0)
            },
        ),
    };

    GoalProgress {
        goal_id: goal.id.clone(),
        current_value,
        target: goal.target,
        progress_percent: progress_percent.max(0.0),
        is_complete,
    }
}

/// Definition-time checks: the metric must be a known summary metric and
/// the period a resolvable token.
pub fn validate_definition(metric: &str, period_token: &str) -> Result<()> {
    if DailyRollup::default().summary().metric(metric).is_none() {
        return Err(anyhow!("unknown metric {metric:?}"));
    }
    period::resolve(period_token, None, None, Utc::now())
        .map_err(|_| anyhow!("period must be a known period token (got {period_token:?})"))?;
    Ok(())
}

impl Engine {
    /// Create and persist a goal. The target is clamped to a minimum of 1
    /// here, at definition time — never at evaluation time.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_goal(
        &self,
        site_id: &str,
        name: &str,
        metric: &str,
        target: f64,
        comparator: Comparator,
        period_token: &str,
        notify: bool,
    ) -> Result<Goal> {
        validate_definition(metric, period_token)?;

        let goal = Goal {
            id: format!("goal_{}", uuid::Uuid::new_v4().simple()),
            site_id: site_id.to_string(),
            name: name.to_string(),
            metric: metric.to_string(),
            target: target.max(1.0),
            comparator,
            period: period_token.to_string(),
            notify,
            created_at: Utc::now().to_rfc3339(),
        };
        self.store
            .set_json(&keys::goal(site_id, &goal.id), &goal)
            .await?;
        Ok(goal)
    }

    pub async fn list_goals(&self, site_id: &str) -> Result<Vec<Goal>> {
        let mut goals = Vec::new();
        for key in self.store.list(&keys::goal_prefix(site_id)).await? {
            if let Some(goal) = self.store.get_json::<Goal>(&key).await? {
                goals.push(goal);
            }
        }
        Ok(goals)
    }

    pub async fn get_goal(&self, site_id: &str, goal_id: &str) -> Result<Option<Goal>> {
        self.store.get_json(&keys::goal(site_id, goal_id)).await
    }

    pub async fn delete_goal(&self, site_id: &str, goal_id: &str) -> Result<bool> {
        let key = keys::goal(site_id, goal_id);
        let existed = self.store.get(&key).await?.is_some();
        if existed {
            self.store.delete(&key).await?;
        }
        Ok(existed)
    }

    /// Evaluate the goal over its own period, resolved against `now`.
    pub async fn goal_progress(&self, goal: &Goal, now: DateTime<Utc>) -> Result<GoalProgress> {
        let range = period::resolve(&goal.period, None, None, now)?;
        let summary = self.combined_rollup(&goal.site_id, range).await?.summary();
        let current_value = summary
            .metric(&goal.metric)
            .ok_or_else(|| anyhow!("unknown metric {:?}", goal.metric))?;
        Ok(evaluate(goal, current_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(metric: &str, target: f64, comparator: Comparator) -> Goal {
        Goal {
            id: "goal_1".to_string(),
            site_id: "S".to_string(),
            name: "traffic".to_string(),
            metric: metric.to_string(),
            target,
            comparator,
            period: "30d".to_string(),
            notify: false,
            created_at: "2024-01-15T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn gte_completes_at_or_above_target() {
        let progress = evaluate(&goal("pageviews", 1000.0, Comparator::Gte), 1500.0);
        assert!(progress.is_complete);
        assert_eq!(progress.progress_percent, 100.0);

        let progress = evaluate(&goal("pageviews", 1000.0, Comparator::Gte), 250.0);
        assert!(!progress.is_complete);
        assert!((progress.progress_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn lte_completes_at_or_below_target() {
        let progress = evaluate(&goal("bounce_rate", 30.0, Comparator::Lte), 20.0);
        assert!(progress.is_complete);
        assert_eq!(progress.progress_percent, 100.0);

        let progress = evaluate(&goal("bounce_rate", 30.0, Comparator::Lte), 60.0);
        assert!(!progress.is_complete);
        assert!((progress.progress_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn exact_target_completes_under_both_comparators() {
        assert!(evaluate(&goal("pageviews", 1000.0, Comparator::Gte), 1000.0).is_complete);
        assert!(evaluate(&goal("pageviews", 1000.0, Comparator::Lte), 1000.0).is_complete);
    }

    #[tokio::test]
    async fn create_clamps_target_to_one() {
        use lumen_core::config::Config;
        use lumen_store::MemoryStore;
        use std::sync::Arc;

        let engine = Engine::new(Arc::new(MemoryStore::new()), Config::default());
        let goal = engine
            .create_goal("S", "g", "pageviews", 0.0, Comparator::Gte, "30d", false)
            .await
            .unwrap();
        assert_eq!(goal.target, 1.0);
    }

    #[tokio::test]
    async fn create_rejects_unknown_metric_and_period() {
        use lumen_core::config::Config;
        use lumen_store::MemoryStore;
        use std::sync::Arc;

        let engine = Engine::new(Arc::new(MemoryStore::new()), Config::default());
        assert!(engine
            .create_goal("S", "g", "nonsense", 10.0, Comparator::Gte, "30d", false)
            .await
            .is_err());
        assert!(engine
            .create_goal("S", "g", "pageviews", 10.0, Comparator::Gte, "14d", false)
            .await
            .is_err());
    }
}
