//! Day-by-day simulation loop.
//!
//! Per trading session:
//! 1. Check the cancellation token
//! 2. Execute the rebalance due at this open, if any (scheduler → ledger)
//! 3. Mark to close and emit the session's `TimeseriesPoint`
//!
//! All provider reads are synchronous and local to the run; nothing is shared
//! with other runs.

use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::data::{PriceSource, SignalSource};
use crate::domain::SignalSet;
use crate::engine::ledger::PositionLedger;
use crate::engine::scheduler::{ExecutionScheduler, OrderBuildError};
use crate::engine::state::{SimulationConfig, SimulationFailure, SimulationOutput};
use crate::error::EngineError;

/// Tolerance on the leverage cap check.
const LEVERAGE_TOLERANCE: f64 = 1e-9;

/// Run a full simulation.
///
/// Configuration and input validation happen before the first session; any
/// error there returns a failure with an empty partial output. Errors during
/// the loop return everything computed up to that point.
pub fn run_simulation(
    config: &SimulationConfig,
    prices: &dyn PriceSource,
    signals: &dyn SignalSource,
    cancel: &CancellationToken,
) -> Result<SimulationOutput, SimulationFailure> {
    config.validate().map_err(SimulationFailure::before_start)?;

    let calendar = prices.trading_days(config.start_date, config.end_date);
    if calendar.is_empty() {
        return Err(SimulationFailure::before_start(EngineError::Configuration(
            format!(
                "no trading sessions between {} and {} in {}",
                config.start_date,
                config.end_date,
                prices.name()
            ),
        )));
    }

    let sets = load_signal_sets(config, signals).map_err(SimulationFailure::before_start)?;

    let mut scheduler =
        ExecutionScheduler::new(calendar.clone(), config.session_gap, config.fractional_shares)
            .map_err(SimulationFailure::before_start)?;
    for set in sets {
        scheduler
            .schedule(set)
            .map_err(SimulationFailure::before_start)?;
    }

    info!(
        sessions = calendar.len(),
        rebalances = scheduler.pending_count(),
        source = prices.name(),
        "simulation started"
    );

    let mut ledger = PositionLedger::new(
        config.initial_cash,
        config.cost_model.clone(),
        config.missing_price,
    );
    let mut output = SimulationOutput {
        points: Vec::with_capacity(calendar.len()),
        ..SimulationOutput::default()
    };

    for &date in &calendar {
        if cancel.is_cancelled() {
            info!(%date, points = output.points.len(), "simulation cancelled");
            return Err(abort(EngineError::Cancelled { date }, output, &mut scheduler));
        }

        if let Some(rebalance) = scheduler.due(date) {
            match scheduler.build_orders(&rebalance, date, &ledger, prices) {
                Ok(orders) => {
                    debug!(%date, orders = orders.len(), "executing rebalance");
                    for order in orders {
                        let trade = ledger.apply_order(&order);
                        output.trades.push(trade);
                        output.orders.push(order);
                    }
                }
                Err(OrderBuildError::MissingOpen(symbol)) => {
                    if let Err(error) = scheduler.defer(rebalance, date, &symbol) {
                        return Err(abort(error, output, &mut scheduler));
                    }
                }
                Err(OrderBuildError::Integrity(error)) => {
                    return Err(abort(error, output, &mut scheduler));
                }
            }
        }

        match ledger.close_day(date, prices) {
            Ok(point) => output.points.push(point),
            Err(error) => return Err(abort(error, output, &mut scheduler)),
        }
    }

    output.warnings = scheduler.take_warnings();
    info!(
        points = output.points.len(),
        trades = output.trades.len(),
        warnings = output.warnings.len(),
        "simulation finished"
    );
    Ok(output)
}

fn abort(
    error: EngineError,
    mut partial: SimulationOutput,
    scheduler: &mut ExecutionScheduler,
) -> SimulationFailure {
    partial.warnings = scheduler.take_warnings();
    SimulationFailure { error, partial }
}

/// Read, validate and group the run's signals.
fn load_signal_sets(
    config: &SimulationConfig,
    signals: &dyn SignalSource,
) -> Result<Vec<SignalSet>, EngineError> {
    let records = signals.signals_between(config.start_date, config.end_date);
    if let Some(bad) = records.iter().find(|s| !s.target_weight.is_finite()) {
        return Err(EngineError::integrity(
            bad.date,
            format!("non-finite target weight for {}", bad.symbol),
        ));
    }

    let sets = SignalSet::group(&records);
    for set in &sets {
        let gross = set.gross_weight();
        if gross > config.leverage_cap + LEVERAGE_TOLERANCE {
            return Err(EngineError::integrity(
                set.date,
                format!(
                    "gross target weight {gross:.6} exceeds leverage cap {}",
                    config.leverage_cap
                ),
            ));
        }
    }
    Ok(sets)
}
