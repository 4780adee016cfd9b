//! session-lens - incremental analysis of conversation logs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use session_lens::analysis::Pipeline;
use session_lens::batch::BatchCoordinator;
use session_lens::config::{AnalyzerConfig, ConfigLoader, MonitorConfig};
use session_lens::display;
use session_lens::monitor::{
    IncrementalMonitor, JsonStateStore, MemoryStateStore, MonitorEvent, StateStore,
};

#[derive(Parser)]
#[command(
    name = "session-lens",
    about = "Reconstruct, classify and rank conversation log messages",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: ./.session-lens.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse one file and print its most important messages.
    Analyze {
        file: PathBuf,
        /// Number of messages to show.
        #[arg(short, long, default_value_t = 10)]
        top: usize,
    },
    /// Analyse many files concurrently.
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Maximum files analysed at once.
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Save monitor state for each file here.
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
    /// Watch files and report new messages as they are appended.
    Monitor {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Poll interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Persist monitor state here to resume across runs.
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Keep state in memory only.
        #[arg(long, conflicts_with = "state_dir")]
        ephemeral: bool,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            token.cancel();
        }
    });
}

fn state_store(dir: Option<PathBuf>) -> Arc<dyn StateStore> {
    match dir {
        Some(dir) => Arc::new(JsonStateStore::new(dir)),
        None => Arc::new(MemoryStateStore::new()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let config = match loader.load_with_source() {
        Ok((config, source)) => {
            tracing::info!(config = %source, "Using configuration");
            config
        }
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };
    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Analyze { file, top } => match pipeline.analyze_file(&file).await {
            Ok(analysis) => {
                display::print_analysis(&analysis, top);
                ExitCode::SUCCESS
            }
            Err(e) => {
                display::print_failure(&file, &e);
                ExitCode::FAILURE
            }
        },
        Commands::Batch {
            files,
            concurrency,
            state_dir,
        } => run_batch(&config, pipeline, files, concurrency, state_dir).await,
        Commands::Monitor {
            files,
            interval_ms,
            state_dir,
            ephemeral,
        } => {
            let state_dir = if ephemeral {
                None
            } else {
                state_dir
                    .or_else(|| config.monitor.state_dir.clone())
                    .or_else(MonitorConfig::default_state_dir)
            };
            let interval = interval_ms.map_or_else(
                || config.monitor.poll_interval(),
                Duration::from_millis,
            );
            run_monitor(pipeline, files, interval, state_dir).await
        }
    }
}

async fn run_batch(
    config: &AnalyzerConfig,
    pipeline: Pipeline,
    files: Vec<PathBuf>,
    concurrency: Option<usize>,
    state_dir: Option<PathBuf>,
) -> ExitCode {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut coordinator =
        BatchCoordinator::new(pipeline, concurrency.unwrap_or(config.batch.concurrency));
    if let Some(dir) = state_dir {
        coordinator = coordinator.with_state_store(state_store(Some(dir)));
    }

    let summary = coordinator.analyze_batch(files, cancel).await;
    display::print_batch_summary(&summary);
    if summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_monitor(
    pipeline: Pipeline,
    files: Vec<PathBuf>,
    interval: Duration,
    state_dir: Option<PathBuf>,
) -> ExitCode {
    if interval.is_zero() {
        display::print_error("poll interval must be greater than 0");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut monitor = IncrementalMonitor::new(pipeline, state_store(state_dir), interval);
    for file in &files {
        monitor.track(file);
    }

    let (tx, mut rx) = mpsc::channel(64);
    let runner = tokio::spawn(async move { monitor.run(cancel, tx).await });

    while let Some(event) = rx.recv().await {
        match event {
            MonitorEvent::Polled(outcome) => display::print_poll(&outcome),
            MonitorEvent::Failed { path, error } => display::print_failure(&path, &error),
        }
    }

    if let Err(e) = runner.await {
        display::print_error(&format!("monitor task failed: {e}"));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
