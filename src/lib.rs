//! `supply_recon` — plan vs. actuals reconciliation for daily supply volumes.
//!
//! Loads a monthly supply plan and a daily actuals history, derives the flat
//! "existing method" baseline, joins both on day-of-month and scores each
//! predictor (MAE, improvement ratio, R²). No charting or UI lives here.

pub mod cache;
pub mod columns;
pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod types;
pub mod util;

pub use cache::TableCache;
pub use columns::{AliasTable, Field};
pub use config::{PipelineConfig, SourceConfig};
pub use error::PipelineError;
pub use metrics::{compute_metrics, daily_gaps};
pub use pipeline::{compare_tables, compute_baseline, merge, select_month, Comparison, ReconciliationPipeline};
pub use types::{ComparisonRow, JoinKind, MetricsBundle};
