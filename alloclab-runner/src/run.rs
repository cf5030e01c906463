//! Run record and its state machine.
//!
//! `Queued → Running → {Completed, Failed}`. Terminal states have no exits.
//! Only the lifecycle manager mutates a `BacktestRun`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use alloclab_core::ErrorKind;

use crate::config::{RunId, RunRequest};
use crate::lifecycle::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            RunStatus::Queued | RunStatus::Running => false,
            RunStatus::Completed | RunStatus::Failed => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error attached to a failed run: a stable kind plus a one-line summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub run_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub output_location: String,
    pub error: Option<RunFailure>,
}

impl BacktestRun {
    pub(crate) fn queued(
        run_id: RunId,
        request: &RunRequest,
        submitted_at: DateTime<Utc>,
        output_location: String,
    ) -> Self {
        Self {
            run_id,
            status: RunStatus::Queued,
            submitted_at,
            started_at: None,
            completed_at: None,
            run_name: request.run.name.clone(),
            start_date: Some(request.run.start_date),
            end_date: Some(request.run.end_date),
            output_location,
            error: None,
        }
    }

    pub(crate) fn start(&mut self, at: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.expect_status(RunStatus::Queued, RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Some(at);
        Ok(())
    }

    pub(crate) fn complete(&mut self, at: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.expect_status(RunStatus::Running, RunStatus::Completed)?;
        self.status = RunStatus::Completed;
        self.completed_at = Some(at);
        Ok(())
    }

    pub(crate) fn fail(&mut self, at: DateTime<Utc>, failure: RunFailure) -> Result<(), LifecycleError> {
        self.expect_status(RunStatus::Running, RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.completed_at = Some(at);
        self.error = Some(failure);
        Ok(())
    }

    fn expect_status(&self, from: RunStatus, to: RunStatus) -> Result<(), LifecycleError> {
        if self.status != from {
            return Err(LifecycleError::InvalidTransition {
                run_id: self.run_id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
