//! Cost/rate tracking for vision-provider calls: daily budget and
//! per-hour call cap, both enforced by the perception loop before it
//! makes another analysis call.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

/// Rough per-call cost estimate used only for the budget heuristic; not a
/// billing figure.
const ESTIMATED_COST_PER_ANALYSIS_USD: f64 = 0.0003;

struct Inner {
    total_analyses: u64,
    total_alerts: u64,
    today: NaiveDate,
    today_analyses: u64,
    hour_analyses: VecDeque<DateTime<Utc>>,
    started_at: DateTime<Utc>,
}

pub struct StatsTracker {
    daily_budget_usd: f64,
    max_analyses_per_hour: u32,
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total_analyses: u64,
    pub today_analyses: u64,
    pub estimated_today_cost_usd: f64,
    pub daily_budget_usd: f64,
    pub budget_remaining_pct: Option<f64>,
    pub analyses_this_hour: u64,
    pub max_per_hour: u32,
    pub total_alerts: u64,
    pub uptime_seconds: i64,
}

impl StatsTracker {
    pub fn new(daily_budget_usd: f64, max_analyses_per_hour: u32) -> Self {
        let now = Utc::now();
        StatsTracker {
            daily_budget_usd,
            max_analyses_per_hour,
            inner: Mutex::new(Inner {
                total_analyses: 0,
                total_alerts: 0,
                today: now.date_naive(),
                today_analyses: 0,
                hour_analyses: VecDeque::new(),
                started_at: now,
            }),
        }
    }

    async fn check_day_rollover(inner: &mut Inner) {
        let today = Utc::now().date_naive();
        if today != inner.today {
            inner.today = today;
            inner.today_analyses = 0;
        }
    }

    fn prune_hour(inner: &mut Inner) {
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        while let Some(front) = inner.hour_analyses.front() {
            if *front < cutoff {
                inner.hour_analyses.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn record_analysis(&self) {
        let mut inner = self.inner.lock().await;
        Self::check_day_rollover(&mut inner).await;
        inner.total_analyses += 1;
        inner.today_analyses += 1;
        inner.hour_analyses.push_back(Utc::now());
        Self::prune_hour(&mut inner);
    }

    pub async fn record_alert(&self) {
        let mut inner = self.inner.lock().await;
        inner.total_alerts += 1;
    }

    pub async fn budget_exceeded(&self) -> bool {
        let mut inner = self.inner.lock().await;
        Self::check_day_rollover(&mut inner).await;
        Self::prune_hour(&mut inner);

        if self.daily_budget_usd > 0.0 {
            let estimated = inner.today_analyses as f64 * ESTIMATED_COST_PER_ANALYSIS_USD;
            if estimated >= self.daily_budget_usd {
                return true;
            }
        }
        if self.max_analyses_per_hour > 0
            && inner.hour_analyses.len() as u32 >= self.max_analyses_per_hour
        {
            return true;
        }
        false
    }

    pub async fn summary(&self) -> StatsSummary {
        let mut inner = self.inner.lock().await;
        Self::check_day_rollover(&mut inner).await;
        Self::prune_hour(&mut inner);

        let estimated_today_cost = inner.today_analyses as f64 * ESTIMATED_COST_PER_ANALYSIS_USD;
        let budget_remaining_pct = if self.daily_budget_usd > 0.0 {
            Some(
                ((self.daily_budget_usd - estimated_today_cost) / self.daily_budget_usd * 100.0)
                    .max(0.0),
            )
        } else {
            None
        };

        StatsSummary {
            total_analyses: inner.total_analyses,
            today_analyses: inner.today_analyses,
            estimated_today_cost_usd: estimated_today_cost,
            daily_budget_usd: self.daily_budget_usd,
            budget_remaining_pct,
            analyses_this_hour: inner.hour_analyses.len() as u64,
            max_per_hour: self.max_analyses_per_hour,
            total_alerts: inner.total_alerts,
            uptime_seconds: (Utc::now() - inner.started_at).num_seconds(),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        StatsTracker::new(0.0, 120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn summary_reflects_recorded_analyses_and_alerts() {
        let stats = StatsTracker::default();
        stats.record_analysis().await;
        stats.record_analysis().await;
        stats.record_alert().await;

        let summary = stats.summary().await;
        assert_eq!(summary.total_analyses, 2);
        assert_eq!(summary.today_analyses, 2);
        assert_eq!(summary.total_alerts, 1);
        assert!(summary.budget_remaining_pct.is_none());
    }

    #[tokio::test]
    async fn unlimited_budget_never_exceeded_by_cost() {
        let stats = StatsTracker::new(0.0, 0);
        for _ in 0..1000 {
            stats.record_analysis().await;
        }
        assert!(!stats.budget_exceeded().await);
    }

    #[tokio::test]
    async fn hourly_cap_triggers_budget_exceeded() {
        let stats = StatsTracker::new(0.0, 3);
        for _ in 0..3 {
            stats.record_analysis().await;
        }
        assert!(stats.budget_exceeded().await);
    }

    #[tokio::test]
    async fn daily_budget_triggers_when_estimated_cost_reaches_it() {
        let stats = StatsTracker::new(0.0003, 1000);
        stats.record_analysis().await;
        assert!(stats.budget_exceeded().await);
    }

    #[tokio::test]
    async fn budget_remaining_pct_present_when_budget_set() {
        let stats = StatsTracker::new(1.0, 1000);
        stats.record_analysis().await;
        let summary = stats.summary().await;
        assert!(summary.budget_remaining_pct.unwrap() < 100.0);
    }
}
