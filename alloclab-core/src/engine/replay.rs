//! Independent reconstruction of portfolio value from a trade log.
//!
//! Used to audit persisted artifacts: replaying the trades against the same
//! closes must reproduce `TimeseriesPoint::portfolio_value` for every day.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::data::PriceSource;
use crate::domain::Trade;

/// Portfolio value per date rebuilt from `trades` and closes.
///
/// Cash moves by `quantity * price + commission + slippage_cost` per fill.
/// Positions missing a close are valued at their last seen price.
pub fn replay_portfolio_values(
    initial_cash: f64,
    trades: &[Trade],
    dates: &[NaiveDate],
    prices: &dyn PriceSource,
) -> Vec<(NaiveDate, f64)> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        by_date.entry(trade.execution_date).or_default().push(trade);
    }

    let mut cash = initial_cash;
    let mut shares: BTreeMap<&str, f64> = BTreeMap::new();
    let mut last_price: HashMap<&str, f64> = HashMap::new();
    let mut values = Vec::with_capacity(dates.len());

    for &date in dates {
        if let Some(fills) = by_date.get(&date) {
            for trade in fills {
                cash -= trade.quantity * trade.price + trade.commission + trade.slippage_cost;
                *shares.entry(trade.symbol.as_str()).or_insert(0.0) += trade.quantity;
                last_price.insert(trade.symbol.as_str(), trade.price);
            }
        }
        let mut positions = 0.0;
        for (&symbol, &qty) in &shares {
            if qty == 0.0 {
                continue;
            }
            let price = match prices.bar(symbol, date).close() {
                Some(close) => {
                    last_price.insert(symbol, close);
                    close
                }
                None => last_price.get(symbol).copied().unwrap_or(0.0),
            };
            positions += qty * price;
        }
        values.push((date, cash + positions));
    }
    values
}
