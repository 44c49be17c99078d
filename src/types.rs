use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::util::{format_number, format_optional};

/// One planned day. `planned_volume` is in cubic meters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRecord {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub planned_volume: f64,
}

/// One observed calendar date. `actual_volume` is `None` until the day has
/// been recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualRecord {
    pub date: NaiveDate,
    pub actual_volume: Option<f64>,
}

impl ActualRecord {
    pub fn day(&self) -> u32 {
        self.date.day()
    }
}

/// Loaded plan rows, sorted by `(year, month, day)` with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanTable {
    pub records: Vec<PlanRecord>,
}

/// Loaded actuals rows, sorted by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActualsTable {
    pub records: Vec<ActualRecord>,
}

/// Plan rows for one selected month.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSubset {
    pub year: i32,
    pub month: u32,
    pub records: Vec<PlanRecord>,
}

impl PlanSubset {
    /// A baseline can only be computed when this returns `false`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Actuals rows for one selected month.
#[derive(Debug, Clone, PartialEq)]
pub struct ActualsSubset {
    pub year: i32,
    pub month: u32,
    pub records: Vec<ActualRecord>,
}

impl ActualsSubset {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A planned day with the month's flat baseline attached.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselinedDay {
    pub day: u32,
    pub planned_volume: f64,
    pub baseline_value: f64,
}

/// Plan subset after `compute_baseline`.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselinedPlan {
    pub year: i32,
    pub month: u32,
    pub baseline_value: f64,
    pub days: Vec<BaselinedDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Every planned day, actual absent when unmatched.
    #[default]
    Left,
    /// Only days present on both sides.
    Inner,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Inner => write!(f, "inner"),
        }
    }
}

impl std::str::FromStr for JoinKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "inner" => Ok(Self::Inner),
            other => Err(format!("unknown join kind '{other}' (expected left or inner)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub day: u32,
    pub new_model_value: f64,
    pub baseline_value: f64,
    pub actual_value: Option<f64>,
}

/// Per-day error of each predictor (`actual - predicted`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyGap {
    pub day: u32,
    pub gap_new: Option<f64>,
    pub gap_baseline: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsBundle {
    pub observations: usize,
    pub mean_absolute_error_new: f64,
    pub mean_absolute_error_baseline: f64,
    pub improvement_ratio: f64,
    /// Set when the baseline error is zero and the ratio was forced to 0.
    pub improvement_degenerate: bool,
    /// Raw signed R² of the new model. May be negative.
    pub r2_new: f64,
    /// Raw signed R² of the baseline. May be negative.
    pub r2_baseline: f64,
    /// Set when the actual series is constant and both R² were forced to 0.
    pub r2_degenerate: bool,
}

impl MetricsBundle {
    /// R² of the new model floored at 0 for display.
    pub fn r2_new_display(&self) -> f64 {
        self.r2_new.max(0.0)
    }

    pub fn r2_baseline_display(&self) -> f64 {
        self.r2_baseline.max(0.0)
    }

    pub fn improvement_percent(&self) -> f64 {
        self.improvement_ratio * 100.0
    }
}

// ---------------------------------------------------------------------------
// Rendered rows for CSV export and console previews
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ComparisonReportRow {
    #[serde(rename = "Day")]
    #[tabled(rename = "Day")]
    pub day: u32,
    #[serde(rename = "NewModel")]
    #[tabled(rename = "NewModel")]
    pub new_model: String,
    #[serde(rename = "Baseline")]
    #[tabled(rename = "Baseline")]
    pub baseline: String,
    #[serde(rename = "Actual")]
    #[tabled(rename = "Actual")]
    pub actual: String,
    #[serde(rename = "GapNew")]
    #[tabled(rename = "GapNew")]
    pub gap_new: String,
    #[serde(rename = "GapBaseline")]
    #[tabled(rename = "GapBaseline")]
    pub gap_baseline: String,
}

impl ComparisonReportRow {
    pub fn render(row: &ComparisonRow, gap: &DailyGap) -> Self {
        Self {
            day: row.day,
            new_model: format_number(row.new_model_value, 2),
            baseline: format_number(row.baseline_value, 2),
            actual: format_optional(row.actual_value, 2),
            gap_new: format_optional(gap.gap_new, 2),
            gap_baseline: format_optional(gap.gap_baseline, 2),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MetricsReportRow {
    #[serde(rename = "Predictor")]
    #[tabled(rename = "Predictor")]
    pub predictor: String,
    #[serde(rename = "MAE")]
    #[tabled(rename = "MAE")]
    pub mae: String,
    #[serde(rename = "R2")]
    #[tabled(rename = "R2")]
    pub r2: String,
    #[serde(rename = "R2Raw")]
    #[tabled(rename = "R2Raw")]
    pub r2_raw: String,
}

/// JSON summary written next to the comparison CSV.
#[derive(Debug, Serialize)]
pub struct ComparisonSummary {
    pub year: i32,
    pub month: u32,
    pub join: JoinKind,
    pub planned_days: usize,
    pub observed_days: usize,
    pub baseline_value: Option<f64>,
    pub actual_range: Option<(f64, f64)>,
    pub metrics: Option<MetricsBundle>,
}
