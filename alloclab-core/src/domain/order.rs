//! Executable orders produced by the scheduler.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn from_quantity(quantity: f64) -> Self {
        if quantity < 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// An order dated at the session it fills in.
///
/// `quantity` is signed: positive buys, negative sells. `price` is that
/// session's opening price. `signal_date` records the close the order was
/// derived from and is always strictly earlier than `execution_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub execution_date: NaiveDate,
    pub signal_date: NaiveDate,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
}

impl Order {
    pub fn side(&self) -> OrderSide {
        OrderSide::from_quantity(self.quantity)
    }

    pub fn notional(&self) -> f64 {
        self.quantity.abs() * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_follows_quantity_sign() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let order = Order {
            execution_date: date,
            signal_date: date.pred_opt().unwrap(),
            symbol: "SPY".into(),
            quantity: -10.0,
            price: 50.0,
        };
        assert_eq!(order.side(), OrderSide::Sell);
        assert_eq!(order.notional(), 500.0);
        assert_eq!(OrderSide::Buy.sign(), 1.0);
    }
}
