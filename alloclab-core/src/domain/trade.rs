//! Trade — persisted realization of a filled order. Immutable once written.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub execution_date: NaiveDate,
    pub symbol: String,
    /// Signed share count: positive bought, negative sold.
    pub quantity: f64,
    pub price: f64,
    pub notional: f64,
    pub commission: f64,
    pub slippage_cost: f64,
    pub cash_after: f64,
    /// Realized PnL; set only when the trade reduced an existing position.
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
}

impl Trade {
    pub fn side(&self) -> OrderSide {
        OrderSide::from_quantity(self.quantity)
    }

    pub fn is_closing(&self) -> bool {
        self.pnl.is_some()
    }

    /// Total friction paid on this fill.
    pub fn cost(&self) -> f64 {
        self.commission + self.slippage_cost
    }
}
