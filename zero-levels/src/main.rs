//! Zero Levels - key level proximity scanner for USDT perpetuals.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use zero_common::config::Config;
use zero_common::logging::init_from_config;
use zero_levels::scanner::{LevelReport, ReportFormat, ScanProgress};
use zero_levels::LevelsService;

/// Find instruments trading near last week's or last month's high/low.
#[derive(Parser, Debug)]
#[command(name = "zero-levels")]
#[command(author = "theonlyhennygod")]
#[command(version)]
#[command(about = "Key level proximity scanner for USDT perpetuals", long_about = None)]
struct Cli {
    /// Config file (default: ~/.zero-levels/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one pass and print the report
    Scan {
        /// Proximity threshold in percent
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Size of the closest-N table
        #[arg(long)]
        top_k: Option<usize>,

        /// Output format (markdown, json)
        #[arg(short, long, default_value = "markdown")]
        format: ReportFormat,

        /// Include the per-instrument diagnostic table
        #[arg(long)]
        diagnostics: bool,

        /// Also write the report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rescan on the refresh interval until interrupted
    Watch {
        /// Output format (markdown, json)
        #[arg(short, long, default_value = "markdown")]
        format: ReportFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_with_env(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_from_config(&config.observability);
    info!("Zero Levels v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Scan {
            threshold,
            top_k,
            format,
            diagnostics,
            output,
        } => run_scan(config, threshold, top_k, format, diagnostics, output).await,
        Commands::Watch { format } => run_watch(config, format).await,
    }
}

async fn run_scan(
    config: Config,
    threshold: Option<f64>,
    top_k: Option<usize>,
    format: ReportFormat,
    diagnostics: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let service = LevelsService::new(config).context("Failed to build scanner")?;
    let threshold = match threshold {
        Some(value) => service.settings.threshold_override(value)?,
        None => service.settings.threshold,
    };
    let top_k = match top_k {
        Some(value) => service.settings.top_k_override(value)?,
        None => service.settings.top_k,
    };
    let diagnostics = diagnostics || service.settings.diagnostics;

    let progress = ScanProgress::new();
    let ticker = tokio::spawn(progress_line(progress.clone()));
    let tables = service.scan_once(threshold, top_k, &progress).await;
    ticker.abort();
    eprintln!();
    let tables = tables.context("Scan failed")?;

    let report = LevelReport::new(&tables).with_diagnostics(diagnostics);
    println!("{}", report.generate(format));

    if let Some(path) = output {
        let written = report.save_to_file(&path, format)?;
        info!(path = %written.display(), "Saved report");
    }
    Ok(())
}

async fn run_watch(config: Config, format: ReportFormat) -> Result<()> {
    let service = LevelsService::new(config).context("Failed to build scanner")?;
    let diagnostics = service.settings.diagnostics;
    let scheduler = service.scheduler();
    let mut updates = scheduler.subscribe();
    let runner = tokio::spawn(scheduler.clone().run());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(tables) = latest {
                    let report = LevelReport::new(&tables).with_diagnostics(diagnostics);
                    println!("{}", report.generate(format));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    scheduler.stop().await;
    runner.await.context("Scheduler task failed")?;
    Ok(())
}

/// Rewrite a `completed/total` line on stderr until the pass finishes.
async fn progress_line(progress: ScanProgress) {
    let mut interval = tokio::time::interval(Duration::from_millis(250));
    loop {
        interval.tick().await;
        let snap = progress.snapshot();
        if snap.total > 0 {
            eprint!(
                "\rScanning {}/{} ({:.0}%)",
                snap.completed,
                snap.total,
                snap.fraction() * 100.0
            );
            let _ = std::io::stderr().flush();
            if snap.is_done() {
                break;
            }
        }
    }
}
