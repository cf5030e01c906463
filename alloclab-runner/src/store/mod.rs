//! Artifact store for run records and outputs.
//!
//! Everything is addressed by `run_id`. Completed runs' artifacts are
//! immutable once written; readers may call concurrently.

mod fs;
mod memory;
mod tables;

use std::path::PathBuf;

use thiserror::Error;

use alloclab_core::domain::{TimeseriesPoint, Trade};
use alloclab_core::engine::{DataGapWarning, SimulationOutput};

use crate::config::RunRequest;
use crate::metrics::BacktestSummary;
use crate::run::BacktestRun;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run '{0}' not found")]
    NotFound(String),

    #[error("run '{run_id}' has no {artifact} artifact")]
    MissingArtifact {
        run_id: String,
        artifact: &'static str,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] polars::prelude::PolarsError),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Durable storage for run records and their artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Where this run's artifacts live, for `BacktestRun::output_location`.
    fn location(&self, run_id: &str) -> String;

    /// Insert or replace the run record.
    fn save_run(&self, run: &BacktestRun) -> Result<(), StoreError>;

    fn load_run(&self, run_id: &str) -> Result<BacktestRun, StoreError>;

    /// All run records, oldest submission first.
    fn list_runs(&self) -> Result<Vec<BacktestRun>, StoreError>;

    fn save_request(&self, run_id: &str, request: &RunRequest) -> Result<(), StoreError>;

    fn load_request(&self, run_id: &str) -> Result<RunRequest, StoreError>;

    /// Persist timeseries, trades and warnings (complete or partial).
    fn save_output(&self, run_id: &str, output: &SimulationOutput) -> Result<(), StoreError>;

    fn load_timeseries(&self, run_id: &str) -> Result<Vec<TimeseriesPoint>, StoreError>;

    fn load_trades(&self, run_id: &str) -> Result<Vec<Trade>, StoreError>;

    fn load_warnings(&self, run_id: &str) -> Result<Vec<DataGapWarning>, StoreError>;

    fn save_summary(&self, run_id: &str, summary: &BacktestSummary) -> Result<(), StoreError>;

    fn load_summary(&self, run_id: &str) -> Result<BacktestSummary, StoreError>;
}

fn sort_runs(runs: &mut [BacktestRun]) {
    runs.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}
