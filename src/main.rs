use aadhaar_pulse::app::PulseService;
use aadhaar_pulse::config::PulseConfig;
use aadhaar_pulse::domain::SchemaType;
use aadhaar_pulse::{logging, metrics};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "aadhaar_pulse")]
#[command(about = "Bronze/Silver/Gold pipeline for enrolment and update log extracts")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to ./pulse.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the Prometheus metrics snapshot to stderr after the command finishes
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen CSV files and append the valid rows to Bronze
    Ingest {
        files: Vec<PathBuf>,
    },
    /// Rebuild Silver and recompute Gold
    Transform {
        /// Restrict the Silver run to one schema (enrolment, biometric_update, demographic_update)
        #[arg(long)]
        schema: Option<SchemaType>,
    },
    /// Ingest then transform
    Run {
        files: Vec<PathBuf>,
    },
    /// National summary of the current Gold snapshot
    Summary,
    /// Service shadows, utilization, age ladder, surges, spikes and migration verdicts
    Insights,
    /// Metrics for one district
    District {
        name: String,
        #[arg(long)]
        state: Option<String>,
    },
    /// Metrics for one pincode
    Pincode {
        code: String,
    },
    /// Bronze row and batch counts per schema
    Stats,
    /// Metrics recorded while opening the store, in Prometheus text format
    Metrics,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn ingest_all(service: &PulseService, files: &[PathBuf]) -> anyhow::Result<()> {
    if files.is_empty() {
        warn!("No input files given");
    }
    for path in files {
        let span = tracing::info_span!("ingest", file = %path.display());
        let _enter = span.enter();
        match service.ingest_file(path).await {
            Ok(report) => print_json(&report)?,
            // One bad file does not stop the others
            Err(e) => error!("Ingest failed: {:#}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PulseConfig::from_file(path)?,
        None => PulseConfig::load()?,
    };
    let _log_guard = logging::init_logging(&config.logging);
    metrics::init_metrics();

    let service = PulseService::open(&config).await?;

    match cli.command {
        Commands::Ingest { files } => ingest_all(&service, &files).await?,
        Commands::Transform { schema } => {
            let report = service.transform(schema).await?;
            print_json(&report)?;
        }
        Commands::Run { files } => {
            ingest_all(&service, &files).await?;
            let report = service.transform(None).await?;
            print_json(&report)?;
        }
        Commands::Summary => match service.metrics().summary() {
            Some(summary) => print_json(&summary)?,
            None => info!("No Gold snapshot yet; run transform first"),
        },
        Commands::Insights => match service.metrics().insights() {
            Some(insights) => print_json(&insights)?,
            None => info!("No Gold snapshot yet; run transform first"),
        },
        Commands::District { name, state } => {
            let view = match state {
                Some(state) => service.metrics().by_district_in_state(&state, &name),
                None => service.metrics().by_district(&name),
            };
            match view {
                Some(view) => print_json(&view)?,
                None => warn!("District '{}' not found", name),
            }
        }
        Commands::Pincode { code } => match service.metrics().by_pincode(&code) {
            Some(view) => print_json(&view)?,
            None => warn!("Pincode '{}' not found", code),
        },
        Commands::Stats => print_json(&service.bronze_stats())?,
        Commands::Metrics => match metrics::render() {
            Some(text) => print!("{}", text),
            None => warn!("No metrics recorder installed (PULSE_METRICS_ADDR serves them over HTTP)"),
        },
    }

    if cli.print_metrics {
        match metrics::render() {
            Some(text) => eprint!("{}", text),
            None => warn!("No metrics recorder installed (PULSE_METRICS_ADDR serves them over HTTP)"),
        }
    }

    Ok(())
}
