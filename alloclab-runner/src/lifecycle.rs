//! Run lifecycle manager — submission, execution, cancellation.
//!
//! The manager is the only writer of run status. Transitions for one run are
//! compare-and-set under the registry lock, so a run can only be started
//! once; the simulation itself runs outside the lock and owns its ledger.
//! Independent runs execute in parallel with no shared mutable state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info, warn};

use alloclab_core::data::{PriceSource, SignalSource};
use alloclab_core::engine::{run_simulation, SimulationOutput};
use alloclab_core::{CancellationToken, ErrorKind};

use crate::config::{ConfigError, RunId, RunRequest};
use crate::metrics::BacktestSummary;
use crate::run::{BacktestRun, RunFailure, RunStatus};
use crate::store::{ArtifactStore, StoreError};

/// Errors from the lifecycle manager.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("run '{run_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("run '{0}' not found")]
    NotFound(RunId),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode run request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("run registry lock poisoned")]
    Poisoned,
}

/// Message recorded when artifacts could not be written.
const PERSIST_FAILURE: &str = "run artifacts could not be persisted";

#[derive(Debug)]
struct Tracked {
    run: BacktestRun,
    request: RunRequest,
    cancel: CancellationToken,
}

pub struct RunManager {
    store: Arc<dyn ArtifactStore>,
    runs: Mutex<HashMap<RunId, Tracked>>,
    sequence: AtomicU64,
}

impl RunManager {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            runs: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Validate and queue a run. Every call yields a fresh `run_id`, even for
    /// an identical request.
    pub fn submit(&self, request: RunRequest) -> Result<RunId, LifecycleError> {
        request.validate()?;

        let submitted_at = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let run_id = make_run_id(&request, submitted_at, sequence)?;
        let run = BacktestRun::queued(
            run_id.clone(),
            &request,
            submitted_at,
            self.store.location(&run_id),
        );

        self.store.save_request(&run_id, &request)?;
        self.store.save_run(&run)?;
        self.lock()?.insert(
            run_id.clone(),
            Tracked {
                run,
                request,
                cancel: CancellationToken::new(),
            },
        );
        info!(run_id = %run_id, "run queued");
        Ok(run_id)
    }

    /// Current record: the registry for runs owned here, else the store.
    pub fn status(&self, run_id: &str) -> Result<BacktestRun, LifecycleError> {
        if let Some(tracked) = self.lock()?.get(run_id) {
            return Ok(tracked.run.clone());
        }
        self.store.load_run(run_id).map_err(|e| match e {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            other => LifecycleError::Store(other),
        })
    }

    /// Request cancellation. Returns `false` if the run already finished.
    ///
    /// The running simulation observes the token between trading days.
    pub fn cancel(&self, run_id: &str) -> Result<bool, LifecycleError> {
        let runs = self.lock()?;
        let tracked = runs
            .get(run_id)
            .ok_or_else(|| LifecycleError::NotFound(run_id.to_string()))?;
        if tracked.run.status.is_terminal() {
            return Ok(false);
        }
        tracked.cancel.cancel();
        info!(run_id, status = %tracked.run.status, "cancellation requested");
        Ok(true)
    }

    /// Token an orchestrator can hold to abort the run later.
    pub fn cancellation_token(&self, run_id: &str) -> Result<CancellationToken, LifecycleError> {
        self.lock()?
            .get(run_id)
            .map(|t| t.cancel.clone())
            .ok_or_else(|| LifecycleError::NotFound(run_id.to_string()))
    }

    /// Run a queued simulation to a terminal state.
    ///
    /// Simulation errors do not surface here: they end the run `failed` and
    /// the returned record carries the error. `Err` means the lifecycle
    /// itself could not proceed (unknown run, already started, store down).
    pub fn execute(
        &self,
        run_id: &str,
        prices: &dyn PriceSource,
        signals: &dyn SignalSource,
    ) -> Result<BacktestRun, LifecycleError> {
        let (request, cancel, running) = {
            let mut runs = self.lock()?;
            let tracked = runs
                .get_mut(run_id)
                .ok_or_else(|| LifecycleError::NotFound(run_id.to_string()))?;
            tracked.run.start(Utc::now())?;
            (
                tracked.request.clone(),
                tracked.cancel.clone(),
                tracked.run.clone(),
            )
        };
        if let Err(e) = self.store.save_run(&running) {
            return Err(self.abandon(run_id, e));
        }
        info!(run_id, source = prices.name(), "run started");

        match run_simulation(&request.simulation_config(), prices, signals, &cancel) {
            Ok(output) => {
                if let Err(e) = self.persist_completed(run_id, &request, &output) {
                    return Err(self.abandon(run_id, e));
                }
                let run = self.transition(run_id, |run, at| run.complete(at))?;
                info!(
                    run_id,
                    points = output.points.len(),
                    trades = output.trades.len(),
                    "run completed"
                );
                Ok(run)
            }
            Err(failure) => {
                if let Err(e) = self.store.save_output(run_id, &failure.partial) {
                    warn!(run_id, error = %e, "partial artifacts not saved");
                }
                let kind = failure.error.kind();
                let run = self.transition(run_id, |run, at| {
                    run.fail(
                        at,
                        RunFailure {
                            kind,
                            message: failure.error.to_string(),
                        },
                    )
                })?;
                warn!(
                    run_id,
                    kind = %kind,
                    error = %failure.error,
                    points = failure.partial.points.len(),
                    "run failed"
                );
                Ok(run)
            }
        }
    }

    /// Submit then execute immediately.
    pub fn submit_and_execute(
        &self,
        request: RunRequest,
        prices: &dyn PriceSource,
        signals: &dyn SignalSource,
    ) -> Result<BacktestRun, LifecycleError> {
        let run_id = self.submit(request)?;
        self.execute(&run_id, prices, signals)
    }

    /// Execute several queued runs in parallel against shared read-only data.
    /// Results come back in input order.
    pub fn execute_batch(
        &self,
        run_ids: &[RunId],
        prices: &dyn PriceSource,
        signals: &dyn SignalSource,
    ) -> Vec<Result<BacktestRun, LifecycleError>> {
        run_ids
            .par_iter()
            .map(|run_id| self.execute(run_id, prices, signals))
            .collect()
    }

    fn persist_completed(
        &self,
        run_id: &str,
        request: &RunRequest,
        output: &SimulationOutput,
    ) -> Result<(), StoreError> {
        self.store.save_output(run_id, output)?;
        let summary = BacktestSummary::from_points(
            &output.points,
            &output.trades,
            request.run.initial_cash,
            request.run.risk_free_rate,
        );
        self.store.save_summary(run_id, &summary)
    }

    /// Compare-and-set on the registry record, then persist it.
    fn transition<F>(&self, run_id: &str, apply: F) -> Result<BacktestRun, LifecycleError>
    where
        F: FnOnce(&mut BacktestRun, DateTime<Utc>) -> Result<(), LifecycleError>,
    {
        let updated = {
            let mut runs = self.lock()?;
            let tracked = runs
                .get_mut(run_id)
                .ok_or_else(|| LifecycleError::NotFound(run_id.to_string()))?;
            apply(&mut tracked.run, Utc::now())?;
            tracked.run.clone()
        };
        self.store.save_run(&updated)?;
        Ok(updated)
    }

    /// Mark a run failed after a store error and hand the error back.
    fn abandon(&self, run_id: &str, cause: StoreError) -> LifecycleError {
        error!(run_id, error = %cause, "store failure; marking run failed");
        let failure = RunFailure {
            kind: ErrorKind::DataIntegrity,
            message: PERSIST_FAILURE.to_string(),
        };
        if let Err(e) = self.transition(run_id, |run, at| run.fail(at, failure)) {
            warn!(run_id, error = %e, "could not record failure");
        }
        LifecycleError::Store(cause)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<RunId, Tracked>>, LifecycleError> {
        self.runs.lock().map_err(|_| LifecycleError::Poisoned)
    }
}

/// Content hash of the request, submission time and a process-local sequence.
fn make_run_id(
    request: &RunRequest,
    submitted_at: DateTime<Utc>,
    sequence: u64,
) -> Result<RunId, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(request)?);
    hasher.update(submitted_at.to_rfc3339().as_bytes());
    hasher.update(&sequence.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    Ok(hex.as_str()[..16].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;
    use alloclab_core::data::{InMemoryPrices, InMemorySignals};
    use alloclab_core::domain::{DailyBar, Signal};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn manager() -> RunManager {
        RunManager::new(Arc::new(MemoryArtifactStore::new()))
    }

    fn request() -> RunRequest {
        RunRequest::new(Some("unit".into()), d(1), d(5), 1_000.0)
    }

    fn prices() -> InMemoryPrices {
        InMemoryPrices::from_bars((1..=5).map(|day| ("SPY", DailyBar::new(d(day), 10.0, 10.0))))
    }

    fn signals() -> InMemorySignals {
        InMemorySignals::new(vec![Signal {
            date: d(1),
            symbol: "SPY".into(),
            target_weight: 1.0,
        }])
    }

    #[test]
    fn identical_requests_get_distinct_ids() {
        let m = manager();
        let a = m.submit(request()).unwrap();
        let b = m.submit(request()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
        assert_eq!(m.status(&a).unwrap().status, RunStatus::Queued);
    }

    #[test]
    fn invalid_request_is_rejected_before_queueing() {
        let m = manager();
        let mut req = request();
        req.run.initial_cash = 0.0;
        assert!(matches!(m.submit(req), Err(LifecycleError::Config(_))));
        assert!(m.store().list_runs().unwrap().is_empty());
    }

    #[test]
    fn execute_completes_and_persists_summary() {
        let m = manager();
        let id = m.submit(request()).unwrap();
        let run = m.execute(&id, &prices(), &signals()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.started_at.is_some() && run.completed_at.is_some());
        assert_eq!(m.store().load_summary(&id).unwrap().trades, 1);
        assert_eq!(m.store().load_run(&id).unwrap(), run);
    }

    #[test]
    fn cannot_execute_twice() {
        let m = manager();
        let id = m.submit(request()).unwrap();
        m.execute(&id, &prices(), &signals()).unwrap();
        assert!(matches!(
            m.execute(&id, &prices(), &signals()),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancelled_before_execution_fails_with_kind() {
        let m = manager();
        let id = m.submit(request()).unwrap();
        assert!(m.cancel(&id).unwrap());
        let run = m.execute(&id, &prices(), &signals()).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_ref().map(|e| e.kind), Some(ErrorKind::Cancelled));
        assert!(m.store().load_summary(&id).is_err());
        assert!(!m.cancel(&id).unwrap());
    }

    #[test]
    fn integrity_failure_message_is_display_text() {
        let m = manager();
        let mut req = request();
        req.run.leverage_cap = 0.5;
        let id = m.submit(req).unwrap();
        let run = m.execute(&id, &prices(), &signals()).unwrap();
        let err = run.error.unwrap();
        assert_eq!(err.kind, ErrorKind::DataIntegrity);
        assert!(err.message.contains("leverage cap"));
        assert!(!err.message.contains("DataIntegrity {"));
    }

    #[test]
    fn unknown_run() {
        let m = manager();
        assert!(matches!(m.status("nope"), Err(LifecycleError::NotFound(_))));
        assert!(matches!(m.cancel("nope"), Err(LifecycleError::NotFound(_))));
    }
}
