use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use healthnet_prediction::{
    data::synthetic::SAMPLE_DISTRICTS, Prediction, PredictionConfig, PredictionRequest,
    PredictionService, TelemetryEvent, MAX_HORIZON_DAYS,
};
use serde::Serialize;
use serde_json::json;
use shared_logging::{JsonLogger, LogLevel, LogRecord};

#[derive(Parser, Debug)]
#[command(name = "hn", version, about = "HealthNet outbreak risk and forecast CLI")]
struct Cli {
    /// TOML configuration; built-in defaults when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Appends the telemetry events of this run as JSON lines.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Loads data and trains both engines, printing the refresh report.
    Train,
    /// Risk predictions for one or more districts.
    Predict {
        /// Districts; the sample districts when omitted.
        districts: Vec<String>,
        #[arg(long)]
        disease: Option<String>,
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long)]
        no_environmental: bool,
        #[arg(long)]
        no_population: bool,
    },
    /// Daily case forecast for a district.
    Forecast {
        district: String,
        #[arg(
            long,
            default_value_t = 30,
            value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_HORIZON_DAYS))
        )]
        days: u32,
    },
    /// Summary statistics of the prepared dataset.
    Summary,
    /// Writes the cleaned dataset as CSV with canonical headers.
    Export {
        #[arg(long)]
        output: PathBuf,
    },
    /// Trains and prints model information.
    Info,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Predict { .. } => "predict",
            Self::Forecast { .. } => "forecast",
            Self::Summary => "summary",
            Self::Export { .. } => "export",
            Self::Info => "info",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PredictionConfig::load(path)?,
        None => PredictionConfig::default(),
    };
    let log_path = config.logging.path.clone();
    let service = PredictionService::new(config).context("initialising prediction service")?;
    let command = cli.command.name();
    let outcome = run(&service, cli.command);
    if let Some(path) = log_path.as_deref() {
        log_command(path, command, outcome.as_ref().err())?;
    }
    if let (Some(path), Some(telemetry)) = (cli.event_log.as_ref(), service.telemetry()) {
        append_events(path, &telemetry.drain())?;
    }
    outcome
}

fn run(service: &PredictionService, command: Commands) -> Result<()> {
    match command {
        Commands::Train => print_json(&service.bootstrap()?),
        Commands::Predict {
            districts,
            disease,
            days,
            no_environmental,
            no_population,
        } => {
            service.bootstrap()?;
            let districts: Vec<String> = if districts.is_empty() {
                SAMPLE_DISTRICTS.iter().map(|d| (*d).to_owned()).collect()
            } else {
                districts
            };
            let predictions: Vec<Prediction> = districts
                .into_iter()
                .flat_map(|district| {
                    let mut request = PredictionRequest::new(district)
                        .timeframe_days(days)
                        .snapshots(!no_environmental, !no_population);
                    if let Some(disease) = &disease {
                        request = request.disease(disease.clone());
                    }
                    service.predict(&request)
                })
                .collect();
            print_json(&predictions)
        }
        Commands::Forecast { district, days } => {
            service.bootstrap()?;
            print_json(&service.forecast(&district, days))
        }
        Commands::Summary => {
            let prepared = service.prepared_dataset();
            print_json(&json!({
                "summary": prepared.dataset.summary(),
                "synthetic": prepared.synthetic,
                "dropped_rows": prepared.dropped_rows,
                "unreadable_tables": prepared.failures,
            }))
        }
        Commands::Export { output } => {
            let prepared = service.prepared_dataset();
            let table = prepared.dataset.to_table("canonical.csv");
            write_csv(&output, &table.headers, &table.rows)?;
            println!("wrote {} rows to {}", table.rows.len(), output.display());
            Ok(())
        }
        Commands::Info => {
            service.bootstrap()?;
            print_json(&service.model_info())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_csv(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn log_command(path: &Path, command: &str, error: Option<&anyhow::Error>) -> Result<()> {
    let logger = JsonLogger::open(path)?;
    let record = match error {
        None => LogRecord::new("hn", LogLevel::Info, "command completed"),
        Some(err) => LogRecord::new("hn", LogLevel::Error, "command failed")
            .with_field("error", err.to_string()),
    };
    logger.log(&record.with_field("command", command))
}

fn append_events(path: &Path, events: &[TelemetryEvent]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening event log {}", path.display()))?;
    for event in events {
        serde_json::to_writer(&mut file, event)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}
