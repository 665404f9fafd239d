mod cli;
mod report;
mod schedule;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warmer_core::config::LogFormat;
use warmer_core::{
    load_config, open_ledger, validate_config, Config, ConfigError, HttpProber, LedgerStats,
    LidarrClient, StopHandle, WarmingOrchestrator,
};

use cli::{Args, Command};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        let code = if e.downcast_ref::<ConfigError>().is_some() {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn load_and_validate(path: &Path) -> Result<Config> {
    let config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = match load_and_validate(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", LogFormat::Pretty);
            return Err(e);
        }
    };
    init_logging(&config.monitoring.log_level, config.monitoring.log_format);

    info!("lidarr-cache-warmer {}", VERSION);
    info!("Configuration loaded from {:?}", args.config);

    let ledger = open_ledger(&config.ledger).context("Failed to open ledger")?;
    info!(backend = ledger.backend_name(), "Ledger opened");

    if args.command == Some(Command::Stats) {
        let stats = LedgerStats::collect(
            ledger.as_ref(),
            config.run.cache_recheck_hours,
            chrono::Utc::now(),
        )
        .context("Failed to collect ledger statistics")?;
        println!("{}", report::render_stats(&stats));
        return Ok(());
    }

    let prober = HttpProber::new(&config.probe).context("Failed to create prober")?;
    let health = prober.health_check().await;
    if health.available {
        info!(
            url = prober.base_url(),
            status = health.status_code,
            latency_ms = health.latency_ms,
            "Target API reachable"
        );
    } else {
        warn!(
            url = prober.base_url(),
            status = health.status_code,
            error = health.error.as_deref().unwrap_or(""),
            "Target API looks unhealthy, continuing anyway"
        );
    }

    let stop = StopHandle::new();
    let orchestrator = WarmingOrchestrator::new(
        config.clone(),
        Arc::clone(&ledger),
        Arc::new(prober),
        stop.clone(),
    )
    .with_overrides(args.overrides());

    if args.dry_run {
        let lidarr = LidarrClient::new(&config.lidarr).context("Failed to create Lidarr client")?;
        let snapshot = orchestrator
            .fetch_inventory(&lidarr)
            .await
            .context("Failed to fetch inventory from Lidarr")?;
        let plan = orchestrator.plan(&snapshot).context("Failed to plan run")?;
        println!("{}", report::render_plan(&plan));
        return Ok(());
    }

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Stop requested, finishing in-flight probes");
        signal_stop.stop();
    });

    let config_hash = report::config_hash(&config);
    info!(config_hash = %config_hash, "Effective configuration fingerprint");

    if args.schedule {
        let orchestrator = &orchestrator;
        let config_hash = config_hash.as_str();
        let runs = schedule::run_scheduled(&config.schedule, &stop, move |_| {
            run_once(orchestrator, config_hash)
        })
        .await;
        info!(runs, "Scheduler exited");
        Ok(())
    } else {
        run_once(&orchestrator, &config_hash).await
    }
}

/// One warming run with a fresh Lidarr client, then write the run outputs.
async fn run_once(orchestrator: &WarmingOrchestrator, config_hash: &str) -> Result<()> {
    let config = orchestrator.config();
    let lidarr = LidarrClient::new(&config.lidarr).context("Failed to create Lidarr client")?;
    let summary = orchestrator
        .run_from(&lidarr)
        .await
        .context("Warming run failed")?;

    if let Some(dir) = &config.monitoring.results_dir {
        match report::write_results(dir, &summary, config_hash) {
            Ok(path) => info!(path = %path.display(), "Wrote run results"),
            Err(e) => warn!("Failed to write run results: {:#}", e),
        }
    }
    if let Some(path) = &config.monitoring.metrics_textfile {
        if let Err(e) = report::write_metrics_textfile(path) {
            warn!("Failed to write metrics textfile: {:#}", e);
        }
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
