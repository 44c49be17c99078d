use chrono::Datelike;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::cache::{Loaded, TableCache};
use crate::config::{PipelineConfig, SourceConfig};
use crate::error::{PipelineError, Result};
use crate::metrics::{actual_range, compute_metrics, daily_gaps};
use crate::types::{
    ActualsSubset, ActualsTable, BaselinedDay, BaselinedPlan, ComparisonRow, ComparisonSummary,
    DailyGap, JoinKind, MetricsBundle, PlanSubset, PlanTable,
};

// ---------------------------------------------------------------------------
// Pure stages
// ---------------------------------------------------------------------------

/// Restrict both tables to one month. The plan is matched on `month` only
/// since a plan table covers a single year.
pub fn select_month(
    plan: &PlanTable,
    actuals: &ActualsTable,
    year: i32,
    month: u32,
) -> (PlanSubset, ActualsSubset) {
    let plan_rows = plan
        .records
        .iter()
        .filter(|r| r.month == month)
        .cloned()
        .collect();
    let actual_rows = actuals
        .records
        .iter()
        .filter(|r| r.date.year() == year && r.date.month() == month)
        .cloned()
        .collect();
    (
        PlanSubset {
            year,
            month,
            records: plan_rows,
        },
        ActualsSubset {
            year,
            month,
            records: actual_rows,
        },
    )
}

/// Attach the flat per-day share of the month's total plan to every day.
pub fn compute_baseline(plan: &PlanSubset) -> Result<BaselinedPlan> {
    if plan.is_empty() {
        return Err(PipelineError::DivisionByZero {
            year: plan.year,
            month: plan.month,
        });
    }
    let total: f64 = plan.records.iter().map(|r| r.planned_volume).sum();
    let baseline_value = total / plan.len() as f64;

    let days = plan
        .records
        .iter()
        .map(|r| BaselinedDay {
            day: r.day,
            planned_volume: r.planned_volume,
            baseline_value,
        })
        .collect();
    Ok(BaselinedPlan {
        year: plan.year,
        month: plan.month,
        baseline_value,
        days,
    })
}

/// Join planned days with actuals on day-of-month, ascending by day.
pub fn merge(plan: &BaselinedPlan, actuals: &ActualsSubset, join: JoinKind) -> Vec<ComparisonRow> {
    let by_day: HashMap<u32, Option<f64>> = actuals
        .records
        .iter()
        .map(|r| (r.day(), r.actual_volume))
        .collect();

    let mut rows: Vec<ComparisonRow> = plan
        .days
        .iter()
        .filter_map(|d| {
            let actual = by_day.get(&d.day).copied();
            if join == JoinKind::Inner && actual.is_none() {
                return None;
            }
            Some(ComparisonRow {
                day: d.day,
                new_model_value: d.planned_volume,
                baseline_value: d.baseline_value,
                actual_value: actual.flatten(),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.day);
    rows
}

/// Rows that carry an observed actual, the input `compute_metrics` expects.
pub fn observed(rows: &[ComparisonRow]) -> Vec<ComparisonRow> {
    rows.iter().filter(|r| r.actual_value.is_some()).cloned().collect()
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything produced for one `(year, month)`.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub year: i32,
    pub month: u32,
    pub join: JoinKind,
    pub baseline_value: Option<f64>,
    pub rows: Vec<ComparisonRow>,
    pub gaps: Vec<DailyGap>,
    /// `None` when fewer than two days have been observed.
    pub metrics: Option<MetricsBundle>,
}

impl Comparison {
    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            year: self.year,
            month: self.month,
            join: self.join,
            planned_days: self.rows.len(),
            observed_days: self.rows.iter().filter(|r| r.actual_value.is_some()).count(),
            baseline_value: self.baseline_value,
            actual_range: actual_range(&self.rows),
            metrics: self.metrics.clone(),
        }
    }
}

/// Loaded tables for one pair of sources.
#[derive(Debug, Clone)]
pub struct LoadedSources {
    pub plan: Loaded<PlanTable>,
    pub actuals: Loaded<ActualsTable>,
}

/// Owns the table cache and the configured sources.
#[derive(Debug)]
pub struct ReconciliationPipeline {
    config: PipelineConfig,
    cache: TableCache,
}

impl ReconciliationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let cache = TableCache::new(config.alias_table());
        Self { config, cache }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// Load (or re-use) both configured sources.
    pub fn load(&mut self) -> Result<LoadedSources> {
        let plan_src = self.config.plan.clone();
        let actuals_src = self.config.actuals.clone();
        self.load_sources(&plan_src, &actuals_src)
    }

    pub fn load_sources(&mut self, plan: &SourceConfig, actuals: &SourceConfig) -> Result<LoadedSources> {
        let plan = self.cache.plan(&plan.file, plan.header_row)?;
        let actuals = self.cache.actuals(&actuals.file, actuals.header_row)?;
        info!(
            plan_rows = plan.table.records.len(),
            actual_rows = actuals.table.records.len(),
            plan_cached = plan.from_cache,
            actuals_cached = actuals.from_cache,
            "sources loaded"
        );
        Ok(LoadedSources { plan, actuals })
    }

    /// Full comparison for one month using the configured join.
    pub fn compare(&mut self, year: i32, month: u32) -> Result<Comparison> {
        let join = self.config.report.join;
        let loaded = self.load()?;
        compare_tables(&loaded.plan.table, &loaded.actuals.table, year, month, join)
    }

    pub fn plan_path(&self) -> &Path {
        &self.config.plan.file
    }

    pub fn actuals_path(&self) -> &Path {
        &self.config.actuals.file
    }
}

/// Run every stage on already-loaded tables.
///
/// An empty plan month yields an empty comparison rather than an error;
/// metrics are attempted only on observed rows.
pub fn compare_tables(
    plan: &PlanTable,
    actuals: &ActualsTable,
    year: i32,
    month: u32,
    join: JoinKind,
) -> Result<Comparison> {
    let (plan_subset, actuals_subset) = select_month(plan, actuals, year, month);
    if plan_subset.is_empty() {
        warn!(year, month, "no planned days for the selected month");
        return Ok(Comparison {
            year,
            month,
            join,
            baseline_value: None,
            rows: Vec::new(),
            gaps: Vec::new(),
            metrics: None,
        });
    }

    let baselined = compute_baseline(&plan_subset)?;
    let rows = merge(&baselined, &actuals_subset, join);
    let gaps = daily_gaps(&rows);

    let metrics = match compute_metrics(&observed(&rows)) {
        Ok(m) => Some(m),
        Err(PipelineError::InsufficientData { observations }) => {
            warn!(year, month, observations, "not enough observed days for metrics");
            None
        }
        Err(e) => return Err(e),
    };

    info!(
        year,
        month,
        %join,
        rows = rows.len(),
        baseline = baselined.baseline_value,
        "comparison built"
    );
    Ok(Comparison {
        year,
        month,
        join,
        baseline_value: Some(baselined.baseline_value),
        rows,
        gaps,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActualRecord, PlanRecord};
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn plan_month(year: i32, month: u32, volumes: &[f64]) -> PlanTable {
        PlanTable {
            records: volumes
                .iter()
                .enumerate()
                .map(|(i, v)| PlanRecord {
                    year,
                    month,
                    day: i as u32 + 1,
                    planned_volume: *v,
                })
                .collect(),
        }
    }

    fn actuals(year: i32, month: u32, values: &[(u32, Option<f64>)]) -> ActualsTable {
        ActualsTable {
            records: values
                .iter()
                .map(|(day, v)| ActualRecord {
                    date: NaiveDate::from_ymd_opt(year, month, *day).unwrap(),
                    actual_volume: *v,
                })
                .collect(),
        }
    }

    #[test]
    fn select_month_filters_both_tables() {
        let mut plan = plan_month(2024, 1, &[1.0, 2.0]);
        plan.records.extend(plan_month(2024, 2, &[3.0]).records);
        let mut acts = actuals(2024, 1, &[(1, Some(1.0))]);
        acts.records.extend(actuals(2023, 1, &[(2, Some(9.0))]).records);
        acts.records.extend(actuals(2024, 2, &[(1, Some(3.0))]).records);

        let (p, a) = select_month(&plan, &acts, 2024, 1);
        assert_eq!(p.len(), 2);
        assert_eq!(a.records.len(), 1);
        assert_eq!(a.records[0].date.year(), 2024);

        let (p, a) = select_month(&plan, &acts, 2024, 7);
        assert!(p.is_empty());
        assert!(a.is_empty());
    }

    #[test]
    fn baseline_is_monthly_mean() {
        let plan = plan_month(2024, 1, &[10.0, 20.0, 30.0, 40.0]);
        let (subset, _) = select_month(&plan, &ActualsTable::default(), 2024, 1);
        let b = compute_baseline(&subset).unwrap();
        assert_eq!(b.baseline_value, 25.0);
        assert!(b.days.iter().all(|d| d.baseline_value == 25.0));
    }

    #[test]
    fn baseline_of_empty_month_is_reported() {
        let (subset, _) = select_month(&PlanTable::default(), &ActualsTable::default(), 2024, 3);
        match compute_baseline(&subset) {
            Err(PipelineError::DivisionByZero { year, month }) => {
                assert_eq!((year, month), (2024, 3));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn left_and_inner_day_sets() {
        let plan = plan_month(2024, 1, &[1.0, 2.0, 3.0, 4.0]);
        let acts = actuals(2024, 1, &[(4, Some(4.0)), (2, None)]);
        let (p, a) = select_month(&plan, &acts, 2024, 1);
        let b = compute_baseline(&p).unwrap();

        let left = merge(&b, &a, JoinKind::Left);
        assert_eq!(left.iter().map(|r| r.day).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(left[0].actual_value, None);
        assert_eq!(left[3].actual_value, Some(4.0));

        let inner = merge(&b, &a, JoinKind::Inner);
        assert_eq!(inner.iter().map(|r| r.day).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(inner[0].actual_value, None);
        assert_eq!(observed(&inner).len(), 1);
    }

    #[test]
    fn empty_plan_month_gives_empty_comparison() {
        let plan = plan_month(2024, 1, &[1.0]);
        let acts = ActualsTable::default();
        let c = compare_tables(&plan, &acts, 2024, 5, JoinKind::Left).unwrap();
        assert!(c.rows.is_empty());
        assert!(c.metrics.is_none());
        assert_eq!(c.summary().planned_days, 0);
    }

    #[test]
    fn comparison_summary_counts_observed_days() {
        let plan = plan_month(2024, 1, &[100.0; 31]);
        let acts = actuals(2024, 1, &[(1, Some(90.0)), (2, Some(110.0)), (3, None)]);
        let c = compare_tables(&plan, &acts, 2024, 1, JoinKind::Left).unwrap();
        let s = c.summary();
        assert_eq!(s.planned_days, 31);
        assert_eq!(s.observed_days, 2);
        assert_eq!(s.baseline_value, Some(100.0));
        assert_eq!(s.actual_range, Some((90.0, 110.0)));
        assert_eq!(s.metrics.unwrap().observations, 2);
    }

    proptest! {
        #[test]
        fn baseline_is_constant_and_sums_to_total(volumes in prop::collection::vec(0.0..10_000.0f64, 1..31)) {
            let plan = plan_month(2024, 1, &volumes);
            let (subset, _) = select_month(&plan, &ActualsTable::default(), 2024, 1);
            let b = compute_baseline(&subset).unwrap();
            let n = volumes.len() as f64;
            let total: f64 = volumes.iter().sum();
            prop_assert!(b.days.iter().all(|d| d.baseline_value == b.baseline_value));
            prop_assert_eq!(b.baseline_value, total / n);
            let summed: f64 = b.days.iter().map(|d| d.baseline_value).sum();
            prop_assert!((summed - n * b.baseline_value).abs() <= 1e-9 * (1.0 + summed.abs()));
        }

        #[test]
        fn join_day_sets(
            plan_days in prop::collection::btree_set(1u32..=31, 1..20),
            actual_days in prop::collection::btree_set(1u32..=31, 0..20),
        ) {
            let plan = PlanTable {
                records: plan_days
                    .iter()
                    .map(|d| PlanRecord { year: 2024, month: 1, day: *d, planned_volume: 1.0 })
                    .collect(),
            };
            let acts = ActualsTable {
                records: actual_days
                    .iter()
                    .map(|d| ActualRecord {
                        date: NaiveDate::from_ymd_opt(2024, 1, *d).unwrap(),
                        actual_volume: Some(*d as f64),
                    })
                    .collect(),
            };
            let (p, a) = select_month(&plan, &acts, 2024, 1);
            let b = compute_baseline(&p).unwrap();

            let left: BTreeSet<u32> = merge(&b, &a, JoinKind::Left).iter().map(|r| r.day).collect();
            prop_assert_eq!(&left, &plan_days);

            let inner: BTreeSet<u32> = merge(&b, &a, JoinKind::Inner).iter().map(|r| r.day).collect();
            let expected: BTreeSet<u32> = plan_days.intersection(&actual_days).copied().collect();
            prop_assert_eq!(inner, expected);
        }
    }
}
