use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opsintel_anomaly::{AnomalyDetector, CheckOutcome, DetectionReport};
use opsintel_api::{ApiServer, AppState};
use opsintel_config::ConfigManager;
use opsintel_core::storage::StorageManager;
use opsintel_core::{LoggingConfig, OpsConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the transactions CSV into the database
    Load {
        /// CSV file, overriding `data.csv_path`
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Run every anomaly check once and print the result
    Check {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the alert and metrics API until interrupted
    Serve,
    /// Validate the configuration and exit
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    init_logging(args.debug, &manager.get_config().logging);

    manager.validate().context("Invalid configuration")?;
    let config = manager.into_config();

    match args.command {
        Command::Validate => {
            println!("Configuration {} is valid", args.config.display());
            Ok(())
        }
        Command::Load { csv } => {
            let storage = StorageManager::connect(&config.database).await?;
            let path = csv.unwrap_or_else(|| PathBuf::from(&config.data.csv_path));
            let rows = storage.load_csv(&path).await?;
            println!("Loaded {} rows from {}", rows, path.display());
            Ok(())
        }
        Command::Check { json } => run_check(&config, json).await,
        Command::Serve => serve(config).await,
    }
}

fn init_logging(debug: bool, config: &LoggingConfig) {
    let level = if debug { "debug" } else { config.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_check(config: &OpsConfig, json: bool) -> Result<()> {
    let storage = Arc::new(StorageManager::connect(&config.database).await?);
    let detector = AnomalyDetector::new(storage, &config.detector)?;

    let report = detector.run_all_checks().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

async fn serve(config: OpsConfig) -> Result<()> {
    let storage = Arc::new(StorageManager::connect(&config.database).await?);

    if config.data.load_on_start {
        load_if_present(&storage, Path::new(&config.data.csv_path)).await?;
    }

    let state = AppState::new(storage, &config.detector)?;
    let server = ApiServer::new(&config.api, state)?;

    info!(addr = %server.addr(), "Starting Operations Intelligence API");
    server.run_until(shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

async fn load_if_present(storage: &StorageManager, path: &Path) -> Result<()> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "CSV not found, serving existing table contents"
        );
        return Ok(());
    }

    let rows = storage
        .load_csv(path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!(rows, "Dataset loaded");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}

fn render_report(report: &DetectionReport) -> String {
    let summary = &report.summary;
    let mut out = format!(
        "Alerts: {} ({} critical, {} warning, {} normal), {} unavailable\n\n",
        summary.total_alerts,
        summary.critical,
        summary.warning,
        summary.normal,
        summary.unavailable
    );

    out.push_str(&render_line("Total TPV", &report.total_tpv));
    out.push_str(&render_line("Total transactions", &report.transactions));

    if !report.by_product.is_empty() {
        out.push_str("\nTPV by product:\n");
        for outcome in &report.by_product {
            let label = match outcome {
                CheckOutcome::Evaluated(alert) => alert.dimension.as_str(),
                CheckOutcome::Unavailable(failure) => failure.dimension.as_str(),
            };
            out.push_str(&render_line(label, outcome));
        }
    }
    out
}

fn render_line(label: &str, outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::Evaluated(alert) => format!(
            "{:<6} {:<20} {:>+9.1}%  Z {:>7.2}\n",
            alert.severity.icon(),
            label,
            alert.change_pct,
            alert.z_score
        ),
        CheckOutcome::Unavailable(failure) => {
            format!("{:<6} {:<20} unavailable: {}\n", "[--]", label, failure.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsintel_anomaly::{Alert, CheckFailure, MetricKind, Severity};

    fn alert(dimension: &str, severity: Severity, change_pct: f64, z_score: f64) -> Alert {
        Alert {
            metric: MetricKind::Tpv,
            dimension: dimension.to_string(),
            current_value: 0.0,
            expected_value: 0.0,
            z_score,
            severity,
            change_pct,
            message: String::new(),
        }
    }

    #[test]
    fn test_args_parse_subcommands() {
        let args = Args::parse_from(["opsintel", "--debug", "check", "--json"]);
        assert!(args.debug);
        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert!(matches!(args.command, Command::Check { json: true }));

        let args = Args::parse_from(["opsintel", "-c", "ops.yaml", "load", "--csv", "data.csv"]);
        assert_eq!(args.config, PathBuf::from("ops.yaml"));
        match args.command {
            Command::Load { csv } => assert_eq!(csv, Some(PathBuf::from("data.csv"))),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_render_line_signs_and_precision() {
        let line = render_line(
            "Total TPV",
            &CheckOutcome::Evaluated(alert("total", Severity::Critical, 299.96, 12.3456)),
        );
        assert!(line.starts_with("[!!!]"));
        assert!(line.contains("+300.0%"));
        assert!(line.contains("12.35"));

        let line = render_line(
            "pix",
            &CheckOutcome::Evaluated(alert("pix", Severity::Warning, -20.0, -2.63)),
        );
        assert!(line.contains("-20.0%"));
        assert!(line.contains("-2.63"));
    }

    #[test]
    fn test_render_report_lists_unavailable_checks() {
        let report = DetectionReport {
            generated_at: chrono::Utc::now(),
            total_tpv: CheckOutcome::Evaluated(alert("total", Severity::Normal, 1.0, 0.5)),
            transactions: CheckOutcome::Evaluated(alert("total", Severity::Normal, 0.0, 0.0)),
            by_product: vec![CheckOutcome::Unavailable(CheckFailure {
                metric: MetricKind::Tpv,
                dimension: "pix".into(),
                reason: "Data access error: timeout".into(),
            })],
            summary: Default::default(),
        };

        let text = render_report(&report);
        assert!(text.contains("TPV by product:"));
        assert!(text.contains("[--]"));
        assert!(text.contains("pix"));
        assert!(text.contains("unavailable: Data access error: timeout"));
    }
}
