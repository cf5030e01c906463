//! AllocLab CLI — submit backtest runs and query their artifacts.
//!
//! Commands:
//! - `submit` — run a TOML request against CSV prices and signals
//! - `status` / `runs` — run records
//! - `summary`, `timeseries`, `rolling`, `drawdowns`, `trades` — read paths
//!
//! Query output is JSON on stdout; logs go to stderr. `RUST_LOG` sets the
//! filter and `ALLOCLAB_LOG_FORMAT=json` switches to JSON logs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alloclab_runner::{
    load_prices, load_signals, FsArtifactStore, RunManager, RunQueries, RunRequest, RunStatus,
    SeriesSource,
};

#[derive(Parser)]
#[command(
    name = "alloclab",
    about = "AllocLab CLI — asset-allocation backtest engine"
)]
struct Cli {
    /// Artifact store directory.
    #[arg(long, global = true, default_value = "runs")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit and execute a run.
    Submit {
        /// Path to a TOML run request.
        #[arg(long)]
        config: PathBuf,

        /// Prices CSV: date,symbol,open,close.
        #[arg(long)]
        prices: PathBuf,

        /// Signals CSV: date,symbol,target_weight.
        #[arg(long)]
        signals: PathBuf,
    },
    /// Show a run record.
    Status { run_id: String },
    /// List all runs in the store.
    Runs,
    /// Summary statistics of a completed run.
    Summary { run_id: String },
    /// Equity curve, decimated to a point budget.
    Timeseries {
        run_id: String,

        #[arg(long, value_enum, default_value_t = SourceArg::Completed)]
        source: SourceArg,

        #[arg(long, default_value_t = 500)]
        max_points: usize,
    },
    /// Rolling return, volatility, Sharpe and drawdown.
    Rolling {
        run_id: String,

        #[arg(long, default_value_t = 63)]
        window: usize,

        #[arg(long, default_value_t = 500)]
        max_points: usize,
    },
    /// Drawdown episodes; `--top` ranks the deepest.
    Drawdowns {
        run_id: String,

        #[arg(long)]
        top: Option<usize>,
    },
    /// Trade log, paginated.
    Trades {
        run_id: String,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Completed,
    Diagnostics,
}

impl From<SourceArg> for SeriesSource {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Completed => SeriesSource::Completed,
            SourceArg::Diagnostics => SeriesSource::Diagnostics,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            config,
            prices,
            signals,
        } => run_submit(&cli.store, &config, &prices, &signals),
        Commands::Status { run_id } => print_json(&queries(&cli.store)?.status(&run_id)?),
        Commands::Runs => print_json(&queries(&cli.store)?.runs()?),
        Commands::Summary { run_id } => print_json(&queries(&cli.store)?.summary(&run_id)?),
        Commands::Timeseries {
            run_id,
            source,
            max_points,
        } => print_json(&queries(&cli.store)?.timeseries(&run_id, source.into(), max_points)?),
        Commands::Rolling {
            run_id,
            window,
            max_points,
        } => print_json(&queries(&cli.store)?.rolling(&run_id, window, max_points)?),
        Commands::Drawdowns { run_id, top } => {
            print_json(&queries(&cli.store)?.drawdowns(&run_id, top)?)
        }
        Commands::Trades {
            run_id,
            limit,
            offset,
        } => print_json(&queries(&cli.store)?.trades(&run_id, limit, offset)?),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ALLOCLAB_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn queries(store: &Path) -> Result<RunQueries> {
    let store = FsArtifactStore::new(store)
        .with_context(|| format!("failed to open store {}", store.display()))?;
    Ok(RunQueries::new(Arc::new(store)))
}

fn run_submit(store: &Path, config: &Path, prices: &Path, signals: &Path) -> Result<()> {
    let request = RunRequest::from_file(config)?;
    let prices = load_prices(prices)?;
    let signals = load_signals(signals)?;

    let store = FsArtifactStore::new(store)
        .with_context(|| format!("failed to open store {}", store.display()))?;
    let manager = RunManager::new(Arc::new(store));
    let run = manager.submit_and_execute(request, &prices, &signals)?;
    info!(run_id = %run.run_id, status = %run.status, location = %run.output_location, "run finished");

    print_json(&run)?;
    if run.status == RunStatus::Failed {
        match &run.error {
            Some(e) => bail!("run {} failed ({}): {}", run.run_id, e.kind, e.message),
            None => bail!("run {} failed", run.run_id),
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}
