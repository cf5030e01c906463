//! Simulation engine: cost model, scheduler, ledger and the session loop.

pub mod cost_model;
pub mod ledger;
pub mod replay;
pub mod scheduler;
pub mod simulation;
pub mod state;

pub use cost_model::{CommissionModel, CostBreakdown, CostModel, SlippageModel};
pub use ledger::{Holding, PositionLedger};
pub use replay::replay_portfolio_values;
pub use scheduler::{ExecutionScheduler, OrderBuildError, PendingRebalance};
pub use simulation::run_simulation;
pub use state::{
    DataGapWarning, GapReason, MissingPricePolicy, SessionGapPolicy, SimulationConfig,
    SimulationFailure, SimulationOutput,
};
