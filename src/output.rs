use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use crate::error::{PipelineError, Result};

fn write_error(path: &Path, e: impl ToString) -> PipelineError {
    PipelineError::Output {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| write_error(path, e))?;
    for r in rows {
        wtr.serialize(r).map_err(|e| write_error(path, e))?;
    }
    wtr.flush().map_err(|e| write_error(path, e))?;
    debug!(path = %path.display(), rows = rows.len(), "csv written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(|e| write_error(path, e))?;
    std::fs::write(path, s).map_err(|e| write_error(path, e))?;
    debug!(path = %path.display(), "json written");
    Ok(())
}

/// `<dir>/<stem>_YYYY_MM.<ext>`
pub fn monthly_file(dir: &Path, stem: &str, year: i32, month: u32, ext: &str) -> PathBuf {
    dir.join(format!("{stem}_{year}_{month:02}.{ext}"))
}

/// Render up to `max_rows` rows as a markdown table.
pub fn render_table_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", render_table_rows(rows, max_rows));
}
