//! Filesystem store: one directory per run.
//!
//! ```text
//! <root>/<run_id>/
//!   run.json            run record (rewritten on every transition)
//!   request.json        submitted request
//!   timeseries.json     full or partial series
//!   timeseries.csv
//!   timeseries.parquet
//!   trades.json
//!   trades.csv
//!   warnings.json       DataGap warnings
//!   summary.json        completed runs only
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use alloclab_core::domain::{TimeseriesPoint, Trade};
use alloclab_core::engine::{DataGapWarning, SimulationOutput};

use super::{sort_runs, tables, ArtifactStore, StoreError};
use crate::config::RunRequest;
use crate::metrics::BacktestSummary;
use crate::run::BacktestRun;

const RUN_FILE: &str = "run.json";
const REQUEST_FILE: &str = "request.json";
const TIMESERIES_FILE: &str = "timeseries.json";
const TRADES_FILE: &str = "trades.json";
const WARNINGS_FILE: &str = "warnings.json";
const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn ensure_run_dir(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    fn existing_run_dir(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.run_dir(run_id);
        if !dir.join(RUN_FILE).is_file() {
            return Err(StoreError::NotFound(run_id.to_string()));
        }
        Ok(dir)
    }

    fn read_artifact<T: DeserializeOwned>(
        &self,
        run_id: &str,
        file: &str,
        artifact: &'static str,
    ) -> Result<T, StoreError> {
        let path = self.existing_run_dir(run_id)?.join(file);
        if !path.is_file() {
            return Err(StoreError::MissingArtifact {
                run_id: run_id.to_string(),
                artifact,
            });
        }
        read_json(&path)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn location(&self, run_id: &str) -> String {
        self.run_dir(run_id).display().to_string()
    }

    fn save_run(&self, run: &BacktestRun) -> Result<(), StoreError> {
        let dir = self.ensure_run_dir(&run.run_id)?;
        write_json_atomic(&dir.join(RUN_FILE), run)
    }

    fn load_run(&self, run_id: &str) -> Result<BacktestRun, StoreError> {
        read_json(&self.existing_run_dir(run_id)?.join(RUN_FILE))
    }

    fn list_runs(&self) -> Result<Vec<BacktestRun>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path().join(RUN_FILE);
            if path.is_file() {
                runs.push(read_json(&path)?);
            }
        }
        sort_runs(&mut runs);
        Ok(runs)
    }

    fn save_request(&self, run_id: &str, request: &RunRequest) -> Result<(), StoreError> {
        let dir = self.ensure_run_dir(run_id)?;
        write_json_atomic(&dir.join(REQUEST_FILE), request)
    }

    fn load_request(&self, run_id: &str) -> Result<RunRequest, StoreError> {
        self.read_artifact(run_id, REQUEST_FILE, "request")
    }

    fn save_output(&self, run_id: &str, output: &SimulationOutput) -> Result<(), StoreError> {
        let dir = self.ensure_run_dir(run_id)?;
        write_json_atomic(&dir.join(TIMESERIES_FILE), &output.points)?;
        tables::write_csv(&dir.join("timeseries.csv"), &output.points)?;
        tables::write_timeseries_parquet(&dir.join("timeseries.parquet"), &output.points)?;
        write_json_atomic(&dir.join(TRADES_FILE), &output.trades)?;
        tables::write_csv(&dir.join("trades.csv"), &output.trades)?;
        write_json_atomic(&dir.join(WARNINGS_FILE), &output.warnings)?;
        debug!(
            run_id,
            dir = %dir.display(),
            points = output.points.len(),
            trades = output.trades.len(),
            "artifacts written"
        );
        Ok(())
    }

    fn load_timeseries(&self, run_id: &str) -> Result<Vec<TimeseriesPoint>, StoreError> {
        self.read_artifact(run_id, TIMESERIES_FILE, "timeseries")
    }

    fn load_trades(&self, run_id: &str) -> Result<Vec<Trade>, StoreError> {
        self.read_artifact(run_id, TRADES_FILE, "trades")
    }

    fn load_warnings(&self, run_id: &str) -> Result<Vec<DataGapWarning>, StoreError> {
        self.read_artifact(run_id, WARNINGS_FILE, "warnings")
    }

    fn save_summary(&self, run_id: &str, summary: &BacktestSummary) -> Result<(), StoreError> {
        let dir = self.ensure_run_dir(run_id)?;
        write_json_atomic(&dir.join(SUMMARY_FILE), summary)
    }

    fn load_summary(&self, run_id: &str) -> Result<BacktestSummary, StoreError> {
        self.read_artifact(run_id, SUMMARY_FILE, "summary")
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write to a sibling temp file, then rename over the target.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
