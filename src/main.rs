//! Admissions ETL - command-line front end
//!
//! Reads an admissions export, runs the transformation pipeline and writes a
//! model-ready CSV plus an optional JSON audit report.

use admissions_etl::{DataLoader, Pipeline, PipelineConfig, ZipGazetteer};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Clean and encode an admissions export for modeling", long_about = None)]
struct Cli {
    /// Raw admissions export (CSV)
    #[arg(short, long, required_unless_present = "print_config")]
    input: Option<PathBuf>,

    /// Where to write the model-ready table (CSV)
    #[arg(short, long, required_unless_present = "print_config")]
    output: Option<PathBuf>,

    /// Postal centroid file (CSV, or tab-separated .txt/.tsv)
    #[arg(short, long, required_unless_present = "print_config")]
    gazetteer: Option<PathBuf>,

    /// JSON file overriding default configuration values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the audit report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if cli.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let (Some(input), Some(output), Some(gazetteer_path)) = (cli.input, cli.output, cli.gazetteer)
    else {
        anyhow::bail!("--input, --output and --gazetteer are required");
    };

    let gazetteer = ZipGazetteer::load(&gazetteer_path)
        .with_context(|| format!("failed to load gazetteer {}", gazetteer_path.display()))?;
    let pipeline = Pipeline::new(&config, gazetteer).context("invalid pipeline configuration")?;

    let mut loader = DataLoader::new();
    loader
        .load_csv_with_text_columns(&input, |name| config.reads_as_text(name))
        .with_context(|| format!("failed to read {}", input.display()))?;
    let raw = loader.take_dataframe()?;

    let mut result = pipeline.run(raw).context("pipeline aborted")?;

    DataLoader::write_csv(&mut result.table, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if let Some(report_path) = &cli.report {
        result
            .report
            .write_json(report_path)
            .with_context(|| format!("failed to write report {}", report_path.display()))?;
    }

    info!(
        source = ?loader.get_file_path(),
        rows = result.report.output_rows,
        columns = result.report.output_columns.len(),
        stages = ?pipeline.stage_names(),
        "Pipeline finished"
    );
    Ok(())
}
