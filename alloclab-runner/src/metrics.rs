//! Summary metrics — pure functions over a completed run's series.
//!
//! Every metric is a pure function: timeseries and/or trade list in, scalar
//! out. The summary is always recomputable from the persisted artifacts.

use serde::{Deserialize, Serialize};

use alloclab_core::analytics::{annualize, TRADING_DAYS_PER_YEAR};
use alloclab_core::domain::{TimeseriesPoint, Trade};

/// Aggregate statistics for one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// `None` when volatility is zero.
    pub sharpe_ratio: Option<f64>,
    /// Deepest drawdown as a non-negative magnitude.
    pub max_drawdown: f64,
    pub trades: usize,
    pub initial_cash: f64,
    pub final_equity: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Share of closing trades with positive realized PnL.
    #[serde(default)]
    pub win_rate: Option<f64>,
}

impl BacktestSummary {
    /// Compute the summary from the full series and trade log.
    pub fn from_points(
        points: &[TimeseriesPoint],
        trades: &[Trade],
        initial_cash: f64,
        risk_free_rate: f64,
    ) -> Self {
        let final_equity = points.last().map_or(initial_cash, |p| p.portfolio_value);
        let total = total_return(initial_cash, final_equity);
        let annualized_return = annualize(total, points.len());
        let returns: Vec<f64> = points.iter().map(|p| p.daily_return).collect();
        let annualized_volatility = annualized_volatility(&returns);

        Self {
            total_return: total,
            annualized_return,
            annualized_volatility,
            sharpe_ratio: sharpe_ratio(annualized_return, annualized_volatility, risk_free_rate),
            max_drawdown: max_drawdown(points),
            trades: trades.len(),
            initial_cash,
            final_equity,
            risk_free_rate,
            win_rate: win_rate(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction of starting cash.
pub fn total_return(initial_cash: f64, final_equity: f64) -> f64 {
    if initial_cash <= 0.0 {
        return 0.0;
    }
    final_equity / initial_cash - 1.0
}

/// Sample standard deviation of daily returns, scaled by sqrt(252).
pub fn annualized_volatility(daily_returns: &[f64]) -> f64 {
    let std = std_dev(daily_returns);
    if std < 1e-15 {
        return 0.0;
    }
    std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// `(annualized_return - rf) / volatility`; `None` when volatility is zero.
pub fn sharpe_ratio(annualized_return: f64, annualized_volatility: f64, risk_free_rate: f64) -> Option<f64> {
    if annualized_volatility <= 0.0 {
        return None;
    }
    Some((annualized_return - risk_free_rate) / annualized_volatility)
}

/// Largest `|drawdown|` over the series.
pub fn max_drawdown(points: &[TimeseriesPoint]) -> f64 {
    points
        .iter()
        .map(|p| -p.drawdown)
        .fold(0.0_f64, f64::max)
}

/// Fraction of closing trades with positive PnL. `None` without closes.
pub fn win_rate(trades: &[Trade]) -> Option<f64> {
    let closed: Vec<f64> = trades.iter().filter_map(|t| t.pnl).collect();
    if closed.is_empty() {
        return None;
    }
    let winners = closed.iter().filter(|&&pnl| pnl > 0.0).count();
    Some(winners as f64 / closed.len() as f64)
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
