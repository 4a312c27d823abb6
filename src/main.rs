//! fleetcheck: post-deployment health verifier.
//!
//! This is the binary entry point. It loads configuration from a TOML file
//! (with command-line overrides), initializes tracing on stderr, checks that the
//! orchestration backend is reachable, verifies every registered service, prints
//! the report to stdout, and exits 0 when all services are healthy, 1 otherwise.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetcheck::backend::DockerBackend;
use fleetcheck::config::{
    AppConfig, LoggingConfig, Overrides, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, LOG_LEVEL_HELP,
};
use fleetcheck::registry::ServiceRegistry;
use fleetcheck::report::Reporter;
use fleetcheck::verifier::{Verdict, Verifier};
use fleetcheck::AppError;

/// fleetcheck: verify that no service in the fleet failed, crashed, or logged an error
#[derive(Parser, Debug)]
#[command(name = "fleetcheck", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[arg(short, long, help = LOG_LEVEL_HELP)]
    log_level: Option<String>,

    /// Service to verify (repeatable, replaces the configured registry)
    #[arg(short, long = "service", value_name = "NAME")]
    services: Vec<String>,

    /// Failure signature (repeatable, replaces the configured set)
    #[arg(long = "signature", value_name = "PATTERN")]
    signatures: Vec<String>,

    /// Number of services checked concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-service backend timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            services: self.services.clone(),
            signatures: self.signatures.clone(),
            concurrency: self.concurrency,
            timeout_seconds: self.timeout,
        }
    }
}

/// Initialize tracing with priority: CLI > env > default.
///
/// Logs go to stderr; stdout is reserved for the report.
fn init_tracing(log_level: Option<String>, logging: &LoggingConfig) {
    let log_filter = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));

    if logging.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(config: AppConfig) -> Result<Verdict, AppError> {
    let registry = ServiceRegistry::from_config(&config.registry)?;

    tracing::info!(
        services = registry.len(),
        signatures = ?config.detector.signatures,
        concurrency = config.verifier.concurrency,
        timeout_seconds = config.backend.timeout_seconds,
        "Loaded configuration"
    );

    let backend = Arc::new(DockerBackend::new(config.backend.clone()));
    let verifier = Verifier::from_config(backend, &config)?;

    let outcomes = verifier.run(&registry).await?;
    let verdict = Verdict::from_outcomes(&outcomes);

    let reporter = Reporter::new(&config.report);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    reporter.write_report(&mut out, &outcomes, &verdict)?;
    out.flush()?;

    Ok(verdict)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before tracing so the log format can be honored
    let config = match AppConfig::load_with(&args.config, &args.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fleetcheck: {}: {}", args.config, e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(args.log_level.clone(), &config.logging);

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("fleetcheck.run", %run_id);

    match run(config).instrument(span).await {
        Ok(verdict) => ExitCode::from(verdict.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "Verification aborted");
            eprintln!("fleetcheck: {}", e);
            ExitCode::FAILURE
        }
    }
}
