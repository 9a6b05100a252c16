//! memsweep CLI - cross-platform RAM cleaner service
//!
//! Monitors memory usage and triggers the host platform's cleaning action
//! when usage crosses a configured threshold.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use memsweep::config::{ConfigError, MonitorConfig, RunMode};
use memsweep::monitor::MonitorLoop;
use memsweep::platform;
use memsweep::probe::SysinfoProbe;
use memsweep::report::TracingReporter;

#[derive(Parser)]
#[command(name = "memsweep")]
#[command(about = "Cross-platform RAM cleaner: monitors memory usage and reclaims when a threshold is crossed", long_about = None)]
struct Cli {
    /// RAM percent threshold to trigger cleaning (default: 60)
    #[arg(short, long)]
    threshold: Option<u8>,

    /// Seconds between checks while below threshold (default: 10)
    #[arg(short = 'i', long)]
    check_interval: Option<u64>,

    /// Seconds to wait after a clean attempt before resuming checks (default: 60)
    #[arg(short = 'a', long)]
    after_clean: Option<u64>,

    /// Milliseconds to let the system settle before re-measuring (default: 1000)
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Log file path
    #[arg(short, long, default_value = "memsweep.log")]
    logfile: PathBuf,

    /// Load configuration from a TOML file; explicit flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one check & clean attempt, then exit (useful for testing)
    #[arg(long)]
    once: bool,

    /// Also print log output to the console
    #[arg(short, long)]
    verbose: bool,
}

/// Merge defaults, optional config file and CLI overrides.
fn build_config(cli: &Cli) -> Result<MonitorConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };

    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(interval) = cli.check_interval {
        config.check_interval_secs = interval;
    }
    if let Some(cooldown) = cli.after_clean {
        config.cooldown_secs = cooldown;
    }
    if let Some(settle) = cli.settle_ms {
        config.settle_ms = settle;
    }
    if cli.once {
        config.mode = RunMode::SingleShot;
    }

    config.validate()?;
    Ok(config)
}

/// Append-mode file logging, plus a console layer with --verbose.
/// RUST_LOG overrides the default `info` filter.
fn init_logging(logfile: &Path, verbose: bool) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logfile)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Arc::new(file));

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if verbose {
        registry.with(fmt::layer().with_target(false)).init();
    } else {
        registry.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("memsweep: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = init_logging(&cli.logfile, cli.verbose) {
        eprintln!("memsweep: cannot open log file {}: {}", cli.logfile.display(), e);
        std::process::exit(2);
    }

    // Fail fast, before any sample is taken, if this host has no cleaner:
    // a monitor that can never clean is a configuration error the operator
    // must see immediately.
    let cleaner = match platform::cleaner_for_host() {
        Ok(cleaner) => cleaner,
        Err(e) => {
            error!("{}", e);
            eprintln!("memsweep: {}", e);
            std::process::exit(1);
        }
    };

    if !platform::is_elevated() {
        warn!("Not running elevated - cleaning may fail (needs admin/root)");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut monitor = MonitorLoop::new(
        config,
        SysinfoProbe::new(),
        cleaner,
        TracingReporter::new(),
    );

    match monitor.run(shutdown_rx).await {
        Ok(()) => {}
        Err(e) => {
            error!("memsweep crashed: {}", e);
            std::process::exit(1);
        }
    }
}
