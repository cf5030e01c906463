//! Read paths over persisted runs.
//!
//! All reads are side-effect free. Results for runs that are still queued or
//! running come back as `NotReady`, never as an empty payload. Failed runs
//! expose their partial series only through `SeriesSource::Diagnostics`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use alloclab_core::analytics::{
    decimate, drawdown_episodes, rolling_metrics, top_episodes, DecimatedSeries, DrawdownEpisode,
    RollingMetricPoint,
};
use alloclab_core::domain::{TimeseriesPoint, Trade};
use alloclab_core::{EngineError, ErrorKind};

use crate::metrics::BacktestSummary;
use crate::run::{BacktestRun, RunStatus};
use crate::store::{ArtifactStore, StoreError};

/// Largest trade page a caller may request.
pub const MAX_PAGE_LIMIT: usize = 1_000;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("run '{0}' not found")]
    NotFound(String),

    #[error("run '{run_id}' is {status}; results not yet available")]
    NotReady { run_id: String, status: RunStatus },

    #[error("run '{run_id}' failed ({kind}): {message}")]
    RunFailed {
        run_id: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl QueryError {
    /// Machine-readable kind, where one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            QueryError::NotReady { .. } => Some(ErrorKind::NotReady),
            QueryError::RunFailed { kind, .. } => Some(*kind),
            QueryError::InvalidArgument(_) => Some(ErrorKind::ConfigurationError),
            QueryError::NotFound(_) | QueryError::Store(_) => None,
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => QueryError::NotFound(id),
            other => QueryError::Store(other),
        }
    }
}

impl From<EngineError> for QueryError {
    fn from(e: EngineError) -> Self {
        QueryError::InvalidArgument(e.to_string())
    }
}

/// Which series a timeseries read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    /// Only completed runs.
    #[default]
    Completed,
    /// Whatever was persisted, including a failed run's partial series.
    Diagnostics,
}

/// One page of a longer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone)]
pub struct RunQueries {
    store: Arc<dyn ArtifactStore>,
}

impl RunQueries {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn status(&self, run_id: &str) -> Result<BacktestRun, QueryError> {
        Ok(self.store.load_run(run_id)?)
    }

    pub fn runs(&self) -> Result<Vec<BacktestRun>, QueryError> {
        Ok(self.store.list_runs()?)
    }

    pub fn summary(&self, run_id: &str) -> Result<BacktestSummary, QueryError> {
        self.require_completed(run_id)?;
        Ok(self.store.load_summary(run_id)?)
    }

    pub fn timeseries(
        &self,
        run_id: &str,
        source: SeriesSource,
        max_points: usize,
    ) -> Result<DecimatedSeries<TimeseriesPoint>, QueryError> {
        match source {
            SeriesSource::Completed => {
                self.require_completed(run_id)?;
            }
            SeriesSource::Diagnostics => {
                let run = self.status(run_id)?;
                if !run.status.is_terminal() {
                    return Err(not_ready(&run));
                }
            }
        }
        let points = self.store.load_timeseries(run_id)?;
        Ok(decimate(&points, max_points)?)
    }

    /// Rolling metrics for `window_days`, using the run's risk-free rate.
    pub fn rolling(
        &self,
        run_id: &str,
        window_days: usize,
        max_points: usize,
    ) -> Result<DecimatedSeries<RollingMetricPoint>, QueryError> {
        self.require_completed(run_id)?;
        let risk_free_rate = self.store.load_request(run_id)?.run.risk_free_rate;
        let points = self.store.load_timeseries(run_id)?;
        let rolling = rolling_metrics(&points, window_days, risk_free_rate)?;
        Ok(decimate(&rolling, max_points)?)
    }

    /// Drawdown episodes in date order, or the `top_n` deepest.
    pub fn drawdowns(
        &self,
        run_id: &str,
        top_n: Option<usize>,
    ) -> Result<Vec<DrawdownEpisode>, QueryError> {
        self.require_completed(run_id)?;
        let episodes = drawdown_episodes(&self.store.load_timeseries(run_id)?);
        Ok(match top_n {
            Some(n) => top_episodes(episodes, n),
            None => episodes,
        })
    }

    pub fn trades(&self, run_id: &str, limit: usize, offset: usize) -> Result<Page<Trade>, QueryError> {
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(QueryError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }
        self.require_completed(run_id)?;
        let trades = self.store.load_trades(run_id)?;
        let total = trades.len();
        let items = trades.into_iter().skip(offset).take(limit).collect();
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    fn require_completed(&self, run_id: &str) -> Result<BacktestRun, QueryError> {
        let run = self.status(run_id)?;
        match run.status {
            RunStatus::Completed => Ok(run),
            RunStatus::Queued | RunStatus::Running => Err(not_ready(&run)),
            RunStatus::Failed => {
                let (kind, message) = run
                    .error
                    .map(|e| (e.kind, e.message))
                    .unwrap_or_else(|| (ErrorKind::DataIntegrity, "run failed".to_string()));
                Err(QueryError::RunFailed {
                    run_id: run.run_id,
                    kind,
                    message,
                })
            }
        }
    }
}

fn not_ready(run: &BacktestRun) -> QueryError {
    QueryError::NotReady {
        run_id: run.run_id.clone(),
        status: run.status,
    }
}
