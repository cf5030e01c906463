//! Serializable run request, loadable from TOML.
//!
//! ```toml
//! [run]
//! name = "balanced"
//! start_date = "2020-01-02"
//! end_date = "2023-12-29"
//! initial_cash = 100000.0
//! leverage_cap = 1.0
//! fractional_shares = false
//! risk_free_rate = 0.02
//!
//! [cost_model]
//! commission = { rate = 0.0005, min_per_share = 0.005 }
//! slippage = { type = "fixed_bps", bps = 5.0 }
//!
//! [policy]
//! missing_price = "carry_forward"
//! session_gap = "next_session"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use alloclab_core::engine::{CostModel, MissingPricePolicy, SessionGapPolicy, SimulationConfig};

/// Unique identifier for a submitted run.
pub type RunId = String;

/// Errors from loading or validating a run request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse run config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize run config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid run config: {0}")]
    Invalid(String),
}

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub run: RunSection,
    #[serde(default)]
    pub cost_model: CostModel,
    #[serde(default)]
    pub policy: PolicySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
    #[serde(default = "default_leverage_cap")]
    pub leverage_cap: f64,
    #[serde(default)]
    pub fractional_shares: bool,
    /// Annual rate subtracted in Sharpe ratios.
    #[serde(default)]
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default)]
    pub missing_price: MissingPricePolicy,
    #[serde(default)]
    pub session_gap: SessionGapPolicy,
}

fn default_leverage_cap() -> f64 {
    1.0
}

impl RunRequest {
    /// Request with default costs and policies.
    pub fn new(
        name: Option<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        initial_cash: f64,
    ) -> Self {
        Self {
            run: RunSection {
                name,
                start_date,
                end_date,
                initial_cash,
                leverage_cap: default_leverage_cap(),
                fractional_shares: false,
                risk_free_rate: 0.0,
            },
            cost_model: CostModel::default(),
            policy: PolicySection::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn name(&self) -> Option<&str> {
        self.run.name.as_deref()
    }

    /// Reject anything the simulation would refuse, before a run is queued.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.run.risk_free_rate.is_finite() {
            return Err(ConfigError::Invalid("risk_free_rate must be finite".into()));
        }
        if self.run.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid("run name must not be blank".into()));
        }
        self.simulation_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Engine configuration for this request.
    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            start_date: self.run.start_date,
            end_date: self.run.end_date,
            initial_cash: self.run.initial_cash,
            cost_model: self.cost_model.clone(),
            leverage_cap: self.run.leverage_cap,
            fractional_shares: self.run.fractional_shares,
            missing_price: self.policy.missing_price,
            session_gap: self.policy.session_gap,
        }
    }
}
