//! Position ledger — authoritative cash/position state and daily marks.
//!
//! Per trading day the ledger applies that day's orders (charging the cost
//! model and recording a `Trade` per fill), marks every open position to the
//! close, and emits one `TimeseriesPoint`. The accounting identity
//! `portfolio_value == cash + Σ(shares * close)` holds for every point.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::data::PriceSource;
use crate::domain::{Order, PriceLookup, TimeseriesPoint, Trade};
use crate::engine::cost_model::CostModel;
use crate::engine::state::MissingPricePolicy;
use crate::error::EngineError;

/// Share counts below this are treated as flat.
const SHARE_EPSILON: f64 = 1e-9;

/// Open position in one symbol. Negative `shares` is a short.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Holding {
    pub shares: f64,
    /// Average entry price of the currently open shares.
    pub avg_cost: f64,
}

impl Holding {
    pub fn is_flat(&self) -> bool {
        self.shares.abs() < SHARE_EPSILON
    }
}

/// Fills and costs accumulated since the last close.
#[derive(Debug, Clone, Copy, Default)]
struct DayActivity {
    traded_notional: f64,
    commission: f64,
    slippage_cost: f64,
    n_trades: u32,
}

/// Mutable per-run portfolio state. Mutated strictly in date order.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    initial_cash: f64,
    cash: f64,
    positions: BTreeMap<String, Holding>,
    last_price: HashMap<String, f64>,
    cost_model: CostModel,
    missing_price: MissingPricePolicy,
    running_peak: Option<f64>,
    prev_value: f64,
    last_date: Option<NaiveDate>,
    day: DayActivity,
}

impl PositionLedger {
    pub fn new(initial_cash: f64, cost_model: CostModel, missing_price: MissingPricePolicy) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            positions: BTreeMap::new(),
            last_price: HashMap::new(),
            cost_model,
            missing_price,
            running_peak: None,
            prev_value: initial_cash,
            last_date: None,
            day: DayActivity::default(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn shares(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |h| h.shares)
    }

    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.positions.get(symbol)
    }

    pub fn held_symbols(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(|s| s.as_str())
    }

    /// Last observed price (fill or close) for a symbol.
    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_price.get(symbol).copied()
    }

    /// Portfolio value with positions marked by `price_of`, falling back to
    /// the last observed price and then to cost basis.
    pub fn mark_value<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        let positions: f64 = self
            .positions
            .iter()
            .map(|(symbol, holding)| {
                let price = price_of(symbol)
                    .or_else(|| self.last_price(symbol))
                    .unwrap_or(holding.avg_cost);
                holding.shares * price
            })
            .sum();
        self.cash + positions
    }

    /// Fill an order at its price, charging the cost model.
    pub fn apply_order(&mut self, order: &Order) -> Trade {
        let side = order.side();
        let costs = self
            .cost_model
            .cost(side, &order.symbol, order.quantity, order.price);
        let notional = order.notional();

        self.cash -= order.quantity * order.price + costs.total();

        let holding = self.positions.entry(order.symbol.clone()).or_default();
        let (pnl, pnl_percent) = update_holding(holding, order.quantity, order.price);
        if holding.is_flat() {
            self.positions.remove(&order.symbol);
        }
        self.last_price.insert(order.symbol.clone(), order.price);

        self.day.traded_notional += notional;
        self.day.commission += costs.commission;
        self.day.slippage_cost += costs.slippage_cost;
        self.day.n_trades += 1;

        Trade {
            execution_date: order.execution_date,
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            price: order.price,
            notional,
            commission: costs.commission,
            slippage_cost: costs.slippage_cost,
            cash_after: self.cash,
            pnl,
            pnl_percent,
        }
    }

    /// Mark all positions to `date`'s close and emit the day's point.
    pub fn close_day(
        &mut self,
        date: NaiveDate,
        prices: &dyn PriceSource,
    ) -> Result<TimeseriesPoint, EngineError> {
        if let Some(prev) = self.last_date {
            if date <= prev {
                return Err(EngineError::integrity(
                    date,
                    format!("ledger dates out of order (previous {prev})"),
                ));
            }
        }

        let mut gross = 0.0;
        let mut net = 0.0;
        let mut stale_price = false;

        for (symbol, holding) in &self.positions {
            let price = match prices.bar(symbol, date) {
                PriceLookup::Available(bar) => {
                    validate_price(date, symbol, "close", bar.close)?;
                    self.last_price.insert(symbol.clone(), bar.close);
                    bar.close
                }
                PriceLookup::Missing => match self.missing_price {
                    MissingPricePolicy::Fail => {
                        return Err(EngineError::integrity(
                            date,
                            format!("missing close for held symbol {symbol}"),
                        ));
                    }
                    MissingPricePolicy::CarryForward => {
                        let carried = self.last_price.get(symbol).copied().ok_or_else(|| {
                            EngineError::integrity(
                                date,
                                format!("missing close for {symbol} with no prior price"),
                            )
                        })?;
                        warn!(%date, symbol = %symbol, price = carried, "carrying forward stale close");
                        stale_price = true;
                        carried
                    }
                },
            };
            let market_value = holding.shares * price;
            gross += market_value.abs();
            net += market_value;
        }

        let portfolio_value = self.cash + net;
        let peak = self
            .running_peak
            .map_or(portfolio_value, |p| p.max(portfolio_value));
        self.running_peak = Some(peak);

        let drawdown = if peak > 0.0 {
            (portfolio_value / peak - 1.0).min(0.0)
        } else {
            0.0
        };
        let daily_return = ratio(portfolio_value, self.prev_value).map_or(0.0, |r| r - 1.0);
        let cumulative_return = ratio(portfolio_value, self.initial_cash).map_or(0.0, |r| r - 1.0);

        let point = TimeseriesPoint {
            date,
            portfolio_value,
            drawdown,
            daily_return,
            cumulative_return,
            cash: self.cash,
            gross_exposure: ratio(gross, portfolio_value).unwrap_or(0.0),
            net_exposure: ratio(net, portfolio_value).unwrap_or(0.0),
            turnover: ratio(self.day.traded_notional, portfolio_value).unwrap_or(0.0),
            commission: self.day.commission,
            slippage_cost: self.day.slippage_cost,
            n_trades: self.day.n_trades,
            stale_price,
        };

        self.prev_value = portfolio_value;
        self.last_date = Some(date);
        self.day = DayActivity::default();
        Ok(point)
    }
}

/// Apply a signed fill to a holding. Returns realized `(pnl, pnl_percent)`
/// when the fill reduced the position.
fn update_holding(holding: &mut Holding, quantity: f64, price: f64) -> (Option<f64>, Option<f64>) {
    let current = holding.shares;
    let increasing = current.abs() < SHARE_EPSILON || current.signum() == quantity.signum();

    if increasing {
        let new_shares = current + quantity;
        holding.avg_cost =
            (current.abs() * holding.avg_cost + quantity.abs() * price) / new_shares.abs();
        holding.shares = new_shares;
        return (None, None);
    }

    let closed = quantity.abs().min(current.abs());
    let pnl = (price - holding.avg_cost) * closed * current.signum();
    let basis = holding.avg_cost * closed;
    let pnl_percent = if basis > 0.0 { Some(pnl / basis) } else { None };

    let new_shares = current + quantity;
    if new_shares.abs() < SHARE_EPSILON {
        holding.shares = 0.0;
    } else if new_shares.signum() != current.signum() {
        // Flipped through zero: the remainder is a fresh position at this price.
        holding.shares = new_shares;
        holding.avg_cost = price;
    } else {
        holding.shares = new_shares;
    }
    (Some(pnl), pnl_percent)
}

pub(crate) fn validate_price(
    date: NaiveDate,
    symbol: &str,
    field: &str,
    price: f64,
) -> Result<(), EngineError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::integrity(
            date,
            format!("invalid {field} price {price} for {symbol}"),
        ));
    }
    Ok(())
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else {
        None
    }
}
