//! Simulation configuration, policies, warnings, and run output types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Order, TimeseriesPoint, Trade};
use crate::engine::cost_model::CostModel;
use crate::error::EngineError;

/// What the ledger does when a held symbol has no close for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPricePolicy {
    /// Mark at the last known price and flag the point `stale_price`.
    #[default]
    CarryForward,
    /// Fail the run with a data-integrity error.
    Fail,
}

/// What the scheduler does when the session after a signal is unavailable
/// (holiday, or no opening price for a symbol that must trade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionGapPolicy {
    /// Move the rebalance to the next available session and warn.
    #[default]
    NextSession,
    /// Fail the run with a data-integrity error.
    Fail,
}

/// Configuration for a single simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
    pub cost_model: CostModel,
    /// Upper bound on `Σ|target_weight|` per signal date.
    pub leverage_cap: f64,
    pub fractional_shares: bool,
    pub missing_price: MissingPricePolicy,
    pub session_gap: SessionGapPolicy,
}

impl SimulationConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_cash: f64) -> Self {
        Self {
            start_date,
            end_date,
            initial_cash,
            cost_model: CostModel::frictionless(),
            leverage_cap: 1.0,
            fractional_shares: false,
            missing_price: MissingPricePolicy::default(),
            session_gap: SessionGapPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.start_date > self.end_date {
            return Err(EngineError::Configuration(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "initial_cash must be positive, got {}",
                self.initial_cash
            )));
        }
        if !self.leverage_cap.is_finite() || self.leverage_cap <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "leverage_cap must be positive, got {}",
                self.leverage_cap
            )));
        }
        self.cost_model.validate()
    }
}

/// Why a rebalance did not execute on the session right after its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// The next weekday after the signal is not a trading session.
    MissingSession,
    /// A symbol that must trade has no opening price.
    MissingOpen,
    /// A later signal set landed on the same execution session.
    Superseded,
    /// No trading session remains in the run's range.
    EndOfRange,
}

/// Non-fatal data gap recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGapWarning {
    pub signal_date: NaiveDate,
    /// Session the rebalance was expected to execute on.
    pub expected_date: NaiveDate,
    /// Session it actually executed on, if any.
    pub executed_date: Option<NaiveDate>,
    pub reason: GapReason,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Everything a run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub points: Vec<TimeseriesPoint>,
    pub trades: Vec<Trade>,
    pub orders: Vec<Order>,
    pub warnings: Vec<DataGapWarning>,
}

/// A failed run: the error plus whatever was produced before it.
///
/// The partial output is kept for diagnostics only.
#[derive(Debug, Clone)]
pub struct SimulationFailure {
    pub error: EngineError,
    pub partial: SimulationOutput,
}

impl SimulationFailure {
    pub fn before_start(error: EngineError) -> Self {
        Self {
            error,
            partial: SimulationOutput::default(),
        }
    }
}

impl std::fmt::Display for SimulationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} points computed)",
            self.error,
            self.partial.points.len()
        )
    }
}

impl std::error::Error for SimulationFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    #[test]
    fn rejects_inverted_date_range() {
        let config = SimulationConfig::new(d(10), d(1), 100_000.0);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigurationError);
    }

    #[test]
    fn rejects_non_positive_cash_and_leverage() {
        assert!(SimulationConfig::new(d(1), d(10), 0.0).validate().is_err());
        let mut config = SimulationConfig::new(d(1), d(10), 1_000.0);
        config.leverage_cap = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_policies() {
        let config = SimulationConfig::new(d(1), d(10), 1_000.0);
        assert_eq!(config.missing_price, MissingPricePolicy::CarryForward);
        assert_eq!(config.session_gap, SessionGapPolicy::NextSession);
        assert!(config.validate().is_ok());
    }
}
