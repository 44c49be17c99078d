use crate::columns::{AliasTable, Field};
use crate::error::{PipelineError, Result};
use crate::types::{ActualRecord, ActualsTable, PlanRecord, PlanTable};
use crate::util::{parse_date_tolerant, parse_f64_safe, parse_i32_safe, parse_u32_safe};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Row counts gathered while parsing one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    /// Rows dropped because a date/period key was missing or unparseable.
    pub missing_key: usize,
    /// Rows dropped because their values could not form a valid record.
    pub invalid_rows: usize,
}

pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| PipelineError::data_source(path.display().to_string(), e))
}

/// Split raw CSV bytes into a header and data rows. `header_row` leading rows
/// (title lines, unit banners, ...) are discarded before the header.
fn read_table(origin: &str, bytes: &[u8], header_row: usize) -> Result<(Vec<String>, Vec<StringRecord>)> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = rdr.records().skip(header_row);
    let headers: Vec<String> = match records.next() {
        Some(r) => r
            .map_err(|e| PipelineError::data_source(origin, e))?
            .iter()
            .map(|h| h.to_string())
            .collect(),
        None => {
            return Err(PipelineError::data_source(
                origin,
                format!("no header row after skipping {header_row} row(s)"),
            ))
        }
    };

    let rows = records
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PipelineError::data_source(origin, e))?;
    Ok((headers, rows))
}

fn resolve_columns<const N: usize>(
    origin: &str,
    headers: &[String],
    fields: [Field; N],
    aliases: &AliasTable,
) -> Result<[usize; N]> {
    let mut idx = [0usize; N];
    for (slot, field) in idx.iter_mut().zip(fields) {
        *slot = aliases.resolve(headers, field).ok_or_else(|| {
            PipelineError::data_source(
                origin,
                format!("missing required column '{field}' (headers: {})", headers.join(", ")),
            )
        })?;
    }
    Ok(idx)
}

pub fn parse_plan(
    origin: &str,
    bytes: &[u8],
    header_row: usize,
    aliases: &AliasTable,
) -> Result<(PlanTable, LoadReport)> {
    let (headers, rows) = read_table(origin, bytes, header_row)?;
    let [year_idx, month_idx, day_idx, volume_idx] =
        resolve_columns(origin, &headers, Field::PLAN, aliases)?;

    let mut report = LoadReport::default();
    let mut by_key: BTreeMap<(i32, u32, u32), f64> = BTreeMap::new();

    for row in &rows {
        report.total_rows += 1;

        let key = (
            parse_i32_safe(row.get(year_idx)),
            parse_u32_safe(row.get(month_idx)),
            parse_u32_safe(row.get(day_idx)),
        );
        let (year, month, day) = match key {
            (Some(y), Some(m), Some(d)) => (y, m, d),
            _ => {
                report.missing_key += 1;
                continue;
            }
        };

        // Day must exist in that month (no Feb 30th).
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            warn!(origin, year, month, day, "plan row is not a calendar date, skipped");
            report.invalid_rows += 1;
            continue;
        }
        let planned_volume = match parse_f64_safe(row.get(volume_idx)) {
            Some(v) => v,
            None => {
                warn!(origin, year, month, day, "plan row has no volume, skipped");
                report.invalid_rows += 1;
                continue;
            }
        };

        if by_key.insert((year, month, day), planned_volume).is_some() {
            return Err(PipelineError::data_source(
                origin,
                format!("duplicate plan row for {year}-{month:02}-{day:02}"),
            ));
        }
    }

    let records: Vec<PlanRecord> = by_key
        .into_iter()
        .map(|((year, month, day), planned_volume)| PlanRecord {
            year,
            month,
            day,
            planned_volume,
        })
        .collect();
    report.kept_rows = records.len();
    debug!(origin, ?report, "plan parsed");
    Ok((PlanTable { records }, report))
}

pub fn parse_actuals(
    origin: &str,
    bytes: &[u8],
    header_row: usize,
    aliases: &AliasTable,
) -> Result<(ActualsTable, LoadReport)> {
    let (headers, rows) = read_table(origin, bytes, header_row)?;
    let [date_idx, volume_idx] = resolve_columns(origin, &headers, Field::ACTUALS, aliases)?;

    let mut report = LoadReport::default();
    let mut by_date: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();

    for row in &rows {
        report.total_rows += 1;
        let Some(date) = parse_date_tolerant(row.get(date_idx)) else {
            report.missing_key += 1;
            continue;
        };
        // A blank volume means "not observed yet" and is kept as such.
        let actual_volume = parse_f64_safe(row.get(volume_idx));
        if by_date.insert(date, actual_volume).is_some() {
            return Err(PipelineError::data_source(
                origin,
                format!("duplicate actuals row for {date}"),
            ));
        }
    }

    let records: Vec<ActualRecord> = by_date
        .into_iter()
        .map(|(date, actual_volume)| ActualRecord { date, actual_volume })
        .collect();
    report.kept_rows = records.len();
    debug!(origin, ?report, "actuals parsed");
    Ok((ActualsTable { records }, report))
}

pub fn load_plan(path: &Path, header_row: usize, aliases: &AliasTable) -> Result<(PlanTable, LoadReport)> {
    let bytes = read_source(path)?;
    parse_plan(&path.display().to_string(), &bytes, header_row, aliases)
}

pub fn load_actuals(
    path: &Path,
    header_row: usize,
    aliases: &AliasTable,
) -> Result<(ActualsTable, LoadReport)> {
    let bytes = read_source(path)?;
    parse_actuals(&path.display().to_string(), &bytes, header_row, aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
Supply plan 2024 (internal)
연,월,일,계획 (m³),계획 (ton)
2024,1,1,100,72
2024,1,2,\"1,200.5\",80
2024,1,,90,70
2024,2,30,90,70
2024,1,3,,70
";

    const ACTUALS: &str = "\
일자,실제실적
2024-01-01,95
2024/01/02,
garbage,10
2024-01-03 00:00:00,101.5
";

    #[test]
    fn plan_skips_metadata_row_and_bad_rows() {
        let (table, report) = parse_plan("plan", PLAN.as_bytes(), 1, &AliasTable::default()).unwrap();
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.kept_rows, 2);
        assert_eq!(report.missing_key, 1);
        assert_eq!(report.invalid_rows, 2);
        assert_eq!(table.records[0].day, 1);
        assert_eq!(table.records[1].planned_volume, 1200.5);
    }

    #[test]
    fn plan_without_header_offset_fails_on_columns() {
        let err = parse_plan("plan", PLAN.as_bytes(), 0, &AliasTable::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DataSource { .. }));
        assert!(err.to_string().contains("year"));
    }

    #[test]
    fn actuals_keep_missing_volume_and_drop_missing_date() {
        let (table, report) =
            parse_actuals("actuals", ACTUALS.as_bytes(), 0, &AliasTable::default()).unwrap();
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.missing_key, 1);
        assert_eq!(table.records.len(), 3);
        assert_eq!(table.records[0].actual_volume, Some(95.0));
        assert_eq!(table.records[1].actual_volume, None);
        assert_eq!(table.records[2].day(), 3);
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let csv = "date,actual\n2024-01-01,1\n2024/01/01,2\n";
        let err = parse_actuals("dup", csv.as_bytes(), 0, &AliasTable::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn empty_source_has_no_header() {
        let err = parse_actuals("empty", b"", 0, &AliasTable::default()).unwrap_err();
        assert!(err.to_string().contains("no header row"));
    }

    #[test]
    fn missing_file_is_a_data_source_error() {
        let err = load_plan(Path::new("/nonexistent/plan.csv"), 0, &AliasTable::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DataSource { .. }));
    }
}
