use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use outbreak_detector::config::{AppConfig, LogFormat, LoggingConfig};
use outbreak_detector::loader::{CaseTable, SUPPORTED_DISEASES};
use outbreak_detector::pipeline::{AnalysisReport, AnalysisRequest, Pipeline};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "outbreak-detector",
    about = "Detect outbreak signals in daily disease case counts",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $OUTBREAK_CONFIG, then ./outbreak-detector.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Analyze one region/disease from a CSV file
    Analyze {
        /// Path to the case CSV
        #[arg(long)]
        csv: PathBuf,

        /// Region (CSV `location` column)
        #[arg(long)]
        region: String,

        /// Disease (CSV `disease` column, when present)
        #[arg(long)]
        disease: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List supported diseases
    Diseases,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The configured subscriber needs the config, so loading logs through a
    // scoped stderr subscriber first.
    let mut config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        match &cli.config {
            Some(path) => AppConfig::load(path),
            None => Ok(AppConfig::load_or_default()),
        }
    })?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting outbreak detector API");
            outbreak_detector::serve(config).await?;
        }
        Commands::Analyze {
            csv,
            region,
            disease,
            json,
        } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let table = CaseTable::from_reader(std::io::BufReader::new(file))?;
            let raw_series = table.series_for(&region, Some(&disease))?;

            let pipeline = Pipeline::new(config.analysis)?;
            let report = pipeline
                .run(AnalysisRequest {
                    region,
                    disease,
                    raw_series,
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Diseases => {
            for disease in SUPPORTED_DISEASES {
                println!("{disease}");
            }
        }
    }

    Ok(())
}

fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn print_report(report: &AnalysisReport) {
    let explanation = &report.ai_explanation;
    let summary = &report.summary_stats;

    println!(
        "\n=== Outbreak Analysis: {} in {} ===",
        report.disease, report.region
    );
    println!(
        "Risk level: {} (confidence: {})",
        explanation.risk_level.as_str().to_uppercase(),
        explanation.confidence.as_str()
    );
    println!(
        "Period:     {} to {} ({} days, trend {})",
        summary.date_range.start, summary.date_range.end, summary.data_points, summary.trend
    );
    println!("\n{}", explanation.summary);

    println!("\nAnomalies: {}", report.anomalies.len());
    if !report.anomalies.is_empty() {
        println!("{:<12} | {:>10} | {:>8} | Detected by", "Date", "Cases", "Z");
        println!("{:-<12}-|-{:-<10}-|-{:-<8}-|-{:-<24}", "", "", "", "");
        for a in &report.anomalies {
            let methods: Vec<String> = a.detected_by.iter().map(|m| m.to_string()).collect();
            println!(
                "{:<12} | {:>10.0} | {:>8.2} | {}",
                a.date.to_string(),
                a.cases,
                a.z_score,
                methods.join(", ")
            );
        }
    }

    println!("\nForecast ({} days):", report.forecast.len());
    println!("{:<12} | {:>10} | Interval", "Date", "Forecast");
    println!("{:-<12}-|-{:-<10}-|-{:-<24}", "", "", "");
    for p in &report.forecast {
        println!(
            "{:<12} | {:>10.1} | [{:.1}, {:.1}]",
            p.date.to_string(),
            p.forecast,
            p.lower_bound,
            p.upper_bound
        );
    }

    println!("\nRecommendations:");
    for r in &explanation.recommendations {
        println!(" - {r}");
    }
    println!();
}
