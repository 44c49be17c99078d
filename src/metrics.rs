use crate::error::{PipelineError, Result};
use crate::types::{ComparisonRow, DailyGap, MetricsBundle};
use crate::util::average;

/// Paired observations needed before any statistic is computed.
pub const MIN_OBSERVATIONS: usize = 2;

/// Compare both predictors against the observed actuals.
///
/// Rows without an actual are ignored. Degenerate cases are flagged:
/// - zero baseline error: `improvement_ratio = 0`, `improvement_degenerate`
/// - constant actual series: both R² are 0 and `r2_degenerate` is set
pub fn compute_metrics(rows: &[ComparisonRow]) -> Result<MetricsBundle> {
    let paired: Vec<(f64, f64, f64)> = rows
        .iter()
        .filter_map(|r| r.actual_value.map(|a| (a, r.new_model_value, r.baseline_value)))
        .collect();
    if paired.len() < MIN_OBSERVATIONS {
        return Err(PipelineError::InsufficientData {
            observations: paired.len(),
        });
    }

    let actual: Vec<f64> = paired.iter().map(|p| p.0).collect();
    let new_model: Vec<f64> = paired.iter().map(|p| p.1).collect();
    let baseline: Vec<f64> = paired.iter().map(|p| p.2).collect();

    let mae_new = mean_absolute_error(&actual, &new_model);
    let mae_baseline = mean_absolute_error(&actual, &baseline);

    let (improvement_ratio, improvement_degenerate) = if mae_baseline == 0.0 {
        (0.0, true)
    } else {
        ((mae_baseline - mae_new) / mae_baseline, false)
    };

    let (r2_new, r2_baseline, r2_degenerate) =
        match (r_squared(&actual, &new_model), r_squared(&actual, &baseline)) {
            (Some(n), Some(b)) => (n, b, false),
            _ => (0.0, 0.0, true),
        };

    Ok(MetricsBundle {
        observations: paired.len(),
        mean_absolute_error_new: mae_new,
        mean_absolute_error_baseline: mae_baseline,
        improvement_ratio,
        improvement_degenerate,
        r2_new,
        r2_baseline,
        r2_degenerate,
    })
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .collect();
    average(&errors)
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// `None` when the actual series is constant. Constancy is checked on the
/// values, not on `SS_tot`, which keeps a rounding residue for means such as
/// that of `[0.1, 0.1, 0.1]`. The result is not clamped and can be negative.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    let first = *actual.first()?;
    if actual.iter().all(|a| *a == first) {
        return None;
    }
    let mean = average(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

/// `actual - predicted` per day for both predictors.
pub fn daily_gaps(rows: &[ComparisonRow]) -> Vec<DailyGap> {
    rows.iter()
        .map(|r| DailyGap {
            day: r.day,
            gap_new: r.actual_value.map(|a| a - r.new_model_value),
            gap_baseline: r.actual_value.map(|a| a - r.baseline_value),
        })
        .collect()
}

/// `(min, max)` of the observed actuals, the extent of the perfect-fit line.
pub fn actual_range(rows: &[ComparisonRow]) -> Option<(f64, f64)> {
    rows.iter()
        .filter_map(|r| r.actual_value)
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
