//! In-memory store for tests and embedding.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use alloclab_core::domain::{TimeseriesPoint, Trade};
use alloclab_core::engine::{DataGapWarning, SimulationOutput};

use super::{sort_runs, ArtifactStore, StoreError};
use crate::config::RunRequest;
use crate::metrics::BacktestSummary;
use crate::run::BacktestRun;

#[derive(Debug, Default)]
struct Entry {
    run: Option<BacktestRun>,
    request: Option<RunRequest>,
    output: Option<SimulationOutput>,
    summary: Option<BacktestSummary>,
}

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Read one field of an existing run.
    fn read<T>(
        &self,
        run_id: &str,
        artifact: &'static str,
        get: impl FnOnce(&Entry) -> Option<T>,
    ) -> Result<T, StoreError> {
        let entries = self.lock()?;
        let entry = entries
            .get(run_id)
            .filter(|e| e.run.is_some())
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
        get(entry).ok_or_else(|| StoreError::MissingArtifact {
            run_id: run_id.to_string(),
            artifact,
        })
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn location(&self, run_id: &str) -> String {
        format!("memory://{run_id}")
    }

    fn save_run(&self, run: &BacktestRun) -> Result<(), StoreError> {
        self.lock()?.entry(run.run_id.clone()).or_default().run = Some(run.clone());
        Ok(())
    }

    fn load_run(&self, run_id: &str) -> Result<BacktestRun, StoreError> {
        self.read(run_id, "run", |e| e.run.clone())
    }

    fn list_runs(&self) -> Result<Vec<BacktestRun>, StoreError> {
        let mut runs: Vec<BacktestRun> = self.lock()?.values().filter_map(|e| e.run.clone()).collect();
        sort_runs(&mut runs);
        Ok(runs)
    }

    fn save_request(&self, run_id: &str, request: &RunRequest) -> Result<(), StoreError> {
        self.lock()?.entry(run_id.to_string()).or_default().request = Some(request.clone());
        Ok(())
    }

    fn load_request(&self, run_id: &str) -> Result<RunRequest, StoreError> {
        self.read(run_id, "request", |e| e.request.clone())
    }

    fn save_output(&self, run_id: &str, output: &SimulationOutput) -> Result<(), StoreError> {
        self.lock()?.entry(run_id.to_string()).or_default().output = Some(output.clone());
        Ok(())
    }

    fn load_timeseries(&self, run_id: &str) -> Result<Vec<TimeseriesPoint>, StoreError> {
        self.read(run_id, "timeseries", |e| e.output.as_ref().map(|o| o.points.clone()))
    }

    fn load_trades(&self, run_id: &str) -> Result<Vec<Trade>, StoreError> {
        self.read(run_id, "trades", |e| e.output.as_ref().map(|o| o.trades.clone()))
    }

    fn load_warnings(&self, run_id: &str) -> Result<Vec<DataGapWarning>, StoreError> {
        self.read(run_id, "warnings", |e| e.output.as_ref().map(|o| o.warnings.clone()))
    }

    fn save_summary(&self, run_id: &str, summary: &BacktestSummary) -> Result<(), StoreError> {
        self.lock()?.entry(run_id.to_string()).or_default().summary = Some(summary.clone());
        Ok(())
    }

    fn load_summary(&self, run_id: &str) -> Result<BacktestSummary, StoreError> {
        self.read(run_id, "summary", |e| e.summary.clone())
    }
}
