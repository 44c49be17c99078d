use crate::pipeline::Comparison;
use crate::types::{ComparisonReportRow, MetricsBundle, MetricsReportRow};
use crate::util::format_number;

/// One rendered line per compared day, gaps included.
pub fn comparison_report(comparison: &Comparison) -> Vec<ComparisonReportRow> {
    comparison
        .rows
        .iter()
        .zip(&comparison.gaps)
        .map(|(row, gap)| ComparisonReportRow::render(row, gap))
        .collect()
}

/// Two lines, new model first. R2 is floored at zero, R2Raw is not.
pub fn metrics_report(metrics: &MetricsBundle) -> Vec<MetricsReportRow> {
    let r2 = |display: f64, raw: f64| {
        if metrics.r2_degenerate {
            ("n/a".to_string(), "n/a".to_string())
        } else {
            (format_number(display, 3), format_number(raw, 3))
        }
    };
    let (new_r2, new_raw) = r2(metrics.r2_new_display(), metrics.r2_new);
    let (base_r2, base_raw) = r2(metrics.r2_baseline_display(), metrics.r2_baseline);
    vec![
        MetricsReportRow {
            predictor: "New model".to_string(),
            mae: format_number(metrics.mean_absolute_error_new, 2),
            r2: new_r2,
            r2_raw: new_raw,
        },
        MetricsReportRow {
            predictor: "Baseline".to_string(),
            mae: format_number(metrics.mean_absolute_error_baseline, 2),
            r2: base_r2,
            r2_raw: base_raw,
        },
    ]
}

/// One-line improvement statement for the console.
pub fn improvement_line(metrics: &MetricsBundle) -> String {
    if metrics.improvement_degenerate {
        return "Improvement: n/a (baseline error is zero)".to_string();
    }
    format!(
        "Improvement over baseline: {}% (MAE {} -> {}, {} observed days)",
        format_number(metrics.improvement_percent(), 1),
        format_number(metrics.mean_absolute_error_baseline, 2),
        format_number(metrics.mean_absolute_error_new, 2),
        metrics.observations
    )
}
