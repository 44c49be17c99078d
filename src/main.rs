// Entry point and high-level CLI flow.
//
// - Option [1] loads both sources (through the cache) and prints diagnostics.
// - Option [2] asks for a year and month, writes the comparison CSV and the
//   metrics JSON, and prints markdown previews.
// - After a report, the user can go back to the menu or exit.
// With `--year` and `--month` the report is generated once, without prompts.
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use supply_recon::loader::LoadReport;
use supply_recon::output;
use supply_recon::config::ReportConfig;
use supply_recon::pipeline::{compare_tables, Comparison, LoadedSources};
use supply_recon::reports;
use supply_recon::util;
use supply_recon::{JoinKind, PipelineConfig, ReconciliationPipeline, SourceConfig};

#[derive(Parser)]
#[command(name = "supply_recon")]
#[command(version, about = "Compare a daily supply plan and a flat baseline against actuals", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long, value_name = "FILE", env = "SUPPLY_RECON_CONFIG")]
    config: Option<PathBuf>,

    /// Plan CSV (overrides config)
    #[arg(long, value_name = "FILE")]
    plan: Option<PathBuf>,

    /// Actuals CSV (overrides config)
    #[arg(long, value_name = "FILE")]
    actuals: Option<PathBuf>,

    /// Rows to skip before the plan header
    #[arg(long)]
    plan_header_row: Option<usize>,

    /// Rows to skip before the actuals header
    #[arg(long)]
    actuals_header_row: Option<usize>,

    #[arg(long)]
    year: Option<i32>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,

    /// left | inner
    #[arg(long)]
    join: Option<JoinKind>,

    /// Directory for CSV/JSON outputs
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => match (&cli.plan, &cli.actuals) {
            (Some(plan), Some(actuals)) => {
                PipelineConfig::new(SourceConfig::new(plan, 0), SourceConfig::new(actuals, 0))
            }
            _ => bail!("either --config or both --plan and --actuals are required"),
        },
    };
    if let Some(plan) = &cli.plan {
        config.plan.file = plan.clone();
    }
    if let Some(actuals) = &cli.actuals {
        config.actuals.file = actuals.clone();
    }
    if let Some(n) = cli.plan_header_row {
        config.plan.header_row = n;
    }
    if let Some(n) = cli.actuals_header_row {
        config.actuals.header_row = n;
    }
    if let Some(join) = cli.join {
        config.report.join = join;
    }
    if let Some(dir) = &cli.output_dir {
        config.report.output_dir = dir.clone();
    }
    Ok(config)
}

struct AppState {
    pipeline: ReconciliationPipeline,
    loaded: Option<LoadedSources>,
}

/// Print `prompt` and read one trimmed line. `None` once input is closed.
fn read_line_from<R: BufRead>(input: &mut R, prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_line(prompt: &str) -> Option<String> {
    read_line_from(&mut io::stdin().lock(), prompt)
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N` or
/// input closed.
fn prompt_back_to_menu_from<R: BufRead>(input: &mut R) -> bool {
    loop {
        let Some(resp) = read_line_from(input, "Back to Report Selection (Y/N): ") else {
            return false;
        };
        match resp.to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn prompt_back_to_menu() -> bool {
    prompt_back_to_menu_from(&mut io::stdin().lock())
}

fn prompt_month() -> Option<(i32, u32)> {
    let year = util::parse_i32_safe(Some(read_line("Year: ")?.as_str()));
    let month = util::parse_u32_safe(Some(read_line("Month (1-12): ")?.as_str()));
    match (year, month) {
        (Some(y), Some(m)) if (1..=12).contains(&m) => Some((y, m)),
        _ => {
            println!("Invalid year or month.\n");
            None
        }
    }
}

fn print_load_report(label: &str, report: &LoadReport, cached: bool) {
    println!(
        "{}: {} rows read, {} kept{}",
        label,
        util::format_int(report.total_rows),
        util::format_int(report.kept_rows),
        if cached { " (cached)" } else { "" }
    );
    if report.missing_key > 0 {
        println!(
            "Note: {} rows skipped due to a missing date/period.",
            util::format_int(report.missing_key)
        );
    }
    if report.invalid_rows > 0 {
        println!(
            "Note: {} rows skipped due to parse/validation errors.",
            util::format_int(report.invalid_rows)
        );
    }
}

/// Handle option [1]: load (or re-use) both sources.
fn handle_load(state: &mut AppState) {
    match state.pipeline.load() {
        Ok(loaded) => {
            print_load_report("Plan", &loaded.plan.report, loaded.plan.from_cache);
            print_load_report("Actuals", &loaded.actuals.report, loaded.actuals.from_cache);
            println!();
            state.loaded = Some(loaded);
        }
        Err(e) => eprintln!("Failed to load files: {}\n", e),
    }
}

/// Export and preview one month.
fn write_report(config: &ReportConfig, comparison: &Comparison) -> Result<()> {
    let (year, month) = (comparison.year, comparison.month);
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;

    println!("Plan vs. Actuals ({year}-{month:02}, {} join)\n", comparison.join);
    let rows = reports::comparison_report(comparison);
    let csv_path = output::monthly_file(&config.output_dir, "comparison", year, month, "csv");
    output::write_csv(&csv_path, &rows)?;
    output::preview_table_rows(&rows, config.preview_rows);
    println!("(Full table exported to {})\n", csv_path.display());

    match &comparison.metrics {
        Some(metrics) => {
            println!("Model Fit (days with actuals)\n");
            output::preview_table_rows(&reports::metrics_report(metrics), 2);
            println!("{}\n", reports::improvement_line(metrics));
        }
        None => println!("Not enough observed days to score the predictors.\n"),
    }

    let json_path = output::monthly_file(&config.output_dir, "metrics", year, month, "json");
    output::write_json(&json_path, &comparison.summary())?;
    println!("Summary exported to {}\n", json_path.display());
    Ok(())
}

/// Handle option [2]: compare one month against the tables loaded by [1].
fn handle_generate_report(state: &AppState) {
    let Some(loaded) = &state.loaded else {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return;
    };
    let Some((year, month)) = prompt_month() else {
        return;
    };
    println!();
    let config = state.pipeline.config();
    let result = compare_tables(
        &loaded.plan.table,
        &loaded.actuals.table,
        year,
        month,
        config.report.join,
    )
    .map_err(anyhow::Error::from)
    .and_then(|comparison| write_report(&config.report, &comparison));
    if let Err(e) = result {
        eprintln!("Report failed: {:#}\n", e);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli)?;
    let mut state = AppState {
        pipeline: ReconciliationPipeline::new(config),
        loaded: None,
    };

    if let (Some(year), Some(month)) = (cli.year, cli.month) {
        let comparison = state.pipeline.compare(year, month)?;
        return write_report(&state.pipeline.config().report, &comparison);
    }

    loop {
        println!("Select an option:");
        println!("[1] Load the files");
        println!("[2] Generate comparison report\n");
        let Some(choice) = read_line("Enter choice: ") else {
            println!("Exiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => handle_load(&mut state),
            "2" => {
                println!();
                handle_generate_report(&state);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn closed_input_reads_as_none() {
        assert_eq!(read_line_from(&mut Cursor::new(""), "> "), None);
        assert_eq!(read_line_from(&mut Cursor::new(" 2 \n"), "> "), Some("2".to_string()));
    }

    #[test]
    fn back_to_menu_stops_on_closed_input() {
        assert!(!prompt_back_to_menu_from(&mut Cursor::new("")));
        assert!(!prompt_back_to_menu_from(&mut Cursor::new("maybe\n")));
        assert!(prompt_back_to_menu_from(&mut Cursor::new("x\ny\n")));
    }

    #[test]
    fn report_is_written_from_loaded_tables() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.csv");
        let actuals = dir.path().join("actuals.csv");
        std::fs::write(&plan, "year,month,day,plan\n2024,1,1,10\n2024,1,2,30\n").unwrap();
        std::fs::write(&actuals, "date,actual\n2024-01-01,12\n2024-01-02,28\n").unwrap();

        let mut config = PipelineConfig::new(SourceConfig::new(&plan, 0), SourceConfig::new(&actuals, 0));
        config.report.output_dir = dir.path().join("out");
        let mut pipeline = ReconciliationPipeline::new(config);
        let loaded = pipeline.load().unwrap();

        // Removing the sources must not matter: the stored tables are used.
        std::fs::remove_file(&plan).unwrap();
        std::fs::remove_file(&actuals).unwrap();
        let comparison =
            compare_tables(&loaded.plan.table, &loaded.actuals.table, 2024, 1, JoinKind::Left).unwrap();
        write_report(&pipeline.config().report, &comparison).unwrap();

        let out = dir.path().join("out");
        assert!(out.join("comparison_2024_01.csv").exists());
        let json = std::fs::read_to_string(out.join("metrics_2024_01.json")).unwrap();
        assert!(json.contains("\"observed_days\": 2"));
    }
}
