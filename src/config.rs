use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::columns::{AliasTable, Field};
use crate::error::{PipelineError, Result};
use crate::types::JoinKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub plan: SourceConfig,
    pub actuals: SourceConfig,
    /// Extra column aliases, keyed by canonical field name
    /// (`year`, `month`, `day`, `planned_volume`, `date`, `actual_volume`).
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: PathBuf,
    /// Rows to skip before the header row.
    #[serde(default)]
    pub header_row: usize,
}

impl SourceConfig {
    pub fn new(file: impl Into<PathBuf>, header_row: usize) -> Self {
        Self {
            file: file.into(),
            header_row,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub join: JoinKind,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Rows shown in console previews.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_preview_rows() -> usize {
    10
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            join: JoinKind::default(),
            output_dir: default_output_dir(),
            preview_rows: default_preview_rows(),
        }
    }
}

impl PipelineConfig {
    pub fn new(plan: SourceConfig, actuals: SourceConfig) -> Self {
        Self {
            plan,
            actuals,
            aliases: BTreeMap::new(),
            report: ReportConfig::default(),
        }
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. Relative source paths resolve against the file's
    /// directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        if let Some(base) = path.parent() {
            config.plan.file = rebase(base, &config.plan.file);
            config.actuals.file = rebase(base, &config.actuals.file);
            config.report.output_dir = rebase(base, &config.report.output_dir);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for key in self.aliases.keys() {
            key.parse::<Field>().map_err(PipelineError::Config)?;
        }
        if self.report.preview_rows == 0 {
            return Err(PipelineError::Config("report.preview_rows must be at least 1".into()));
        }
        Ok(())
    }

    /// Default aliases extended with the configured ones.
    pub fn alias_table(&self) -> AliasTable {
        let mut table = AliasTable::default();
        for (key, names) in &self.aliases {
            if let Ok(field) = key.parse::<Field>() {
                table.extend(field, names);
            }
        }
        table
    }
}

fn rebase(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
