//! One mark-to-market observation per trading day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub date: NaiveDate,
    /// `cash + Σ(shares * close)`.
    pub portfolio_value: f64,
    /// `portfolio_value / running_peak - 1`, always ≤ 0.
    pub drawdown: f64,
    pub daily_return: f64,
    pub cumulative_return: f64,
    pub cash: f64,
    pub gross_exposure: f64,
    pub net_exposure: f64,
    pub turnover: f64,
    pub commission: f64,
    pub slippage_cost: f64,
    /// Fills applied on this date.
    #[serde(default)]
    pub n_trades: u32,
    /// At least one held position was marked at a carried-forward close.
    #[serde(default)]
    pub stale_price: bool,
}
