use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gtmfinder::cli::Cli;
use gtmfinder::config::AppConfig;
use gtmfinder::discovery::{SubdomainSource, SubfinderDiscovery};
use gtmfinder::extraction::{CaptureSettings, ChromeDriver, ExtractionPipeline, HttpFetcher};
use gtmfinder::governor::ConcurrencyGovernor;
use gtmfinder::logger::{RunLogger, VerbosityLevel};
use gtmfinder::roster::{self, Roster};
use gtmfinder::{Orchestrator, RunSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run gtmfinder again.");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    init_tracing(verbosity);
    let logger = RunLogger::new(verbosity);

    let mut app_config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;
    apply_overrides(&mut app_config, &cli);
    app_config.validate().context("Invalid configuration")?;

    let input = cli.input.clone().context("--input is required")?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| roster::default_output_path(&input));

    let mut roster = Roster::load(&input, &app_config.roster)?;
    let mut records = roster.records(app_config.discovery.domain_rule);
    logger.info(&format!("Loaded {} rows from {}", roster.len(), input.display()));

    let subfinder = SubfinderDiscovery::new(
        PathBuf::from(&app_config.discovery.subfinder_path),
        std::time::Duration::from_secs(app_config.discovery.subfinder_timeout_secs),
    );
    if app_config.discovery.subdomain_enabled && !subfinder.is_available() {
        logger.error(&SubfinderDiscovery::get_installation_instructions());
        app_config.discovery.subdomain_enabled = false;
    }

    let governor = ConcurrencyGovernor::from_config(&app_config.concurrency);
    governor.log_config();

    let fetcher = HttpFetcher::new(&app_config.http).context("Failed to build HTTP client")?;
    let pipeline = ExtractionPipeline::new(
        Arc::new(fetcher),
        Arc::new(ChromeDriver),
        governor.clone(),
        CaptureSettings::from(&app_config.browser),
        CaptureSettings::from(&app_config.rescue),
    );

    let source: Arc<dyn SubdomainSource> = Arc::new(subfinder);
    let orchestrator = Orchestrator::new(
        RunSettings::from_config(&app_config),
        governor,
        source,
        Arc::new(pipeline),
        logger.clone(),
    );

    let summary = orchestrator.run(&mut records).await;

    roster.apply(&records);
    roster.write(&output)?;

    if let Some(path) = &cli.summary_json {
        summary.export_json(path)?;
        logger.info(&format!("Run summary written to {}", path.display()));
    }

    logger.print_final_summary(&summary, &output.display().to_string());
    Ok(())
}

/// `RUST_LOG` wins over the `-v` count when set
fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gtmfinder={}", verbosity.tracing_directive())));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(AppConfig::is_interactive())
        .try_init();
}

fn apply_overrides(app_config: &mut AppConfig, cli: &Cli) {
    if cli.no_rescue {
        app_config.rescue.enabled = false;
    }
    if cli.no_subdomains {
        app_config.discovery.subdomain_enabled = false;
    }
    if let Some(path) = &cli.subfinder_path {
        app_config.discovery.subfinder_path = path.clone();
    }
    if let Some(n) = cli.org_concurrency {
        app_config.concurrency.organizations = n;
    }
    if let Some(n) = cli.browser_sessions {
        app_config.concurrency.browser_sessions = n;
    }
}
