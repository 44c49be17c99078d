use thiserror::Error;

/// Everything the pipeline can fail with.
///
/// Degenerate numeric outcomes (zero baseline error, constant actuals) are not
/// errors; they are flagged on [`crate::types::MetricsBundle`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source missing, unreadable, malformed, or missing a required column.
    #[error("data source '{origin}': {reason}")]
    DataSource { origin: String, reason: String },

    /// Baseline requested for a month with no planned days.
    #[error("cannot compute baseline for {year}-{month:02}: no planned days selected")]
    DivisionByZero { year: i32, month: u32 },

    /// Fewer than two paired (actual, predicted) observations.
    #[error("insufficient data: {observations} paired observation(s), at least 2 required")]
    InsufficientData { observations: usize },

    #[error("config error: {0}")]
    Config(String),

    /// Report file could not be written.
    #[error("cannot write '{path}': {reason}")]
    Output { path: String, reason: String },
}

impl PipelineError {
    pub fn data_source(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataSource {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
