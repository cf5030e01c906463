//! Cost model — commission and slippage charged on each fill.
//!
//! Costs are cash amounts charged on top of the fill notional; the fill price
//! itself stays at the session open. Every function here is pure: identical
//! inputs always produce identical outputs, so a run can be replayed exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::OrderSide;
use crate::error::EngineError;

/// Commission and slippage for a single fill.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub commission: f64,
    pub slippage_cost: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.commission + self.slippage_cost
    }
}

/// Linear commission on notional with an optional per-share floor.
///
/// `commission = max(rate * |q| * price, min_per_share * |q|)`, plus
/// `sell_fee_rate * notional` on sells (transaction-fee style levies).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommissionModel {
    pub rate: f64,
    #[serde(default)]
    pub min_per_share: f64,
    #[serde(default)]
    pub sell_fee_rate: f64,
}

impl CommissionModel {
    pub fn compute(&self, side: OrderSide, shares: f64, price: f64) -> f64 {
        let notional = shares * price;
        let linear = self.rate * notional;
        let floor = self.min_per_share * shares;
        let fee = match side {
            OrderSide::Sell => self.sell_fee_rate * notional,
            OrderSide::Buy => 0.0,
        };
        linear.max(floor) + fee
    }
}

/// Slippage model, selected by configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlippageModel {
    /// No slippage (ideal case)
    #[default]
    None,

    /// Fixed basis points of notional (1 bp = 0.01%)
    FixedBps { bps: f64 },

    /// Square-root market impact:
    /// `notional * coefficient * sqrt(|q| / daily_volume)`.
    ///
    /// `daily_volume` is the reference volume in shares; `volume_overrides`
    /// replaces it per symbol.
    SquareRoot {
        coefficient: f64,
        daily_volume: f64,
        #[serde(default)]
        volume_overrides: BTreeMap<String, f64>,
    },
}

impl SlippageModel {
    pub fn compute(&self, symbol: &str, shares: f64, price: f64) -> f64 {
        let notional = shares * price;
        match self {
            SlippageModel::None => 0.0,
            SlippageModel::FixedBps { bps } => notional * bps / 10_000.0,
            SlippageModel::SquareRoot {
                coefficient,
                daily_volume,
                volume_overrides,
            } => {
                let volume = volume_overrides
                    .get(symbol)
                    .copied()
                    .unwrap_or(*daily_volume);
                notional * coefficient * (shares / volume).sqrt()
            }
        }
    }
}

/// Execution friction: commission plus slippage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostModel {
    #[serde(default)]
    pub commission: CommissionModel,
    #[serde(default)]
    pub slippage: SlippageModel,
}

impl CostModel {
    pub fn new(commission: CommissionModel, slippage: SlippageModel) -> Self {
        Self {
            commission,
            slippage,
        }
    }

    pub fn frictionless() -> Self {
        Self::default()
    }

    /// Commission and fixed slippage, both in basis points of notional.
    pub fn bps(commission_bps: f64, slippage_bps: f64) -> Self {
        Self {
            commission: CommissionModel {
                rate: commission_bps / 10_000.0,
                ..CommissionModel::default()
            },
            slippage: SlippageModel::FixedBps { bps: slippage_bps },
        }
    }

    /// Cost of trading `quantity` shares at `price`. The sign of `quantity` is
    /// ignored; direction comes from `side`.
    pub fn cost(&self, side: OrderSide, symbol: &str, quantity: f64, price: f64) -> CostBreakdown {
        let shares = quantity.abs();
        if shares == 0.0 {
            return CostBreakdown::default();
        }
        CostBreakdown {
            commission: self.commission.compute(side, shares, price),
            slippage_cost: self.slippage.compute(symbol, shares, price),
        }
    }

    /// Reject parameters that would make costs negative or undefined.
    pub fn validate(&self) -> Result<(), EngineError> {
        let c = &self.commission;
        for (name, value) in [
            ("commission.rate", c.rate),
            ("commission.min_per_share", c.min_per_share),
            ("commission.sell_fee_rate", c.sell_fee_rate),
        ] {
            check_non_negative(name, value)?;
        }
        match &self.slippage {
            SlippageModel::None => Ok(()),
            SlippageModel::FixedBps { bps } => check_non_negative("slippage.bps", *bps),
            SlippageModel::SquareRoot {
                coefficient,
                daily_volume,
                volume_overrides,
            } => {
                check_non_negative("slippage.coefficient", *coefficient)?;
                check_positive("slippage.daily_volume", *daily_volume)?;
                for (symbol, volume) in volume_overrides {
                    check_positive(&format!("slippage.volume_overrides.{symbol}"), *volume)?;
                }
                Ok(())
            }
        }
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::Configuration(format!(
            "{name} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::Configuration(format!(
            "{name} must be a finite positive number, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frictionless_costs_nothing() {
        let cost = CostModel::frictionless().cost(OrderSide::Buy, "SPY", 100.0, 50.0);
        assert_eq!(cost.commission, 0.0);
        assert_eq!(cost.slippage_cost, 0.0);
    }

    #[test]
    fn commission_is_linear_in_notional() {
        let model = CostModel::bps(5.0, 0.0);
        let cost = model.cost(OrderSide::Buy, "SPY", 1000.0, 100.0);
        // 100 * 1000 * 5/10000 = 50
        assert!((cost.commission - 50.0).abs() < 1e-10);
    }

    #[test]
    fn per_share_minimum_applies_to_cheap_shares() {
        let model = CostModel::new(
            CommissionModel {
                rate: 0.0001,
                min_per_share: 0.005,
                sell_fee_rate: 0.0,
            },
            SlippageModel::None,
        );
        // linear = 0.0001 * 1000 * 2 = 0.2, floor = 0.005 * 1000 = 5
        let cost = model.cost(OrderSide::Buy, "PENNY", 1000.0, 2.0);
        assert!((cost.commission - 5.0).abs() < 1e-10);
    }

    #[test]
    fn sell_fee_only_on_sells() {
        let model = CostModel::new(
            CommissionModel {
                rate: 0.0,
                min_per_share: 0.0,
                sell_fee_rate: 0.0001,
            },
            SlippageModel::None,
        );
        let buy = model.cost(OrderSide::Buy, "SPY", 100.0, 100.0);
        let sell = model.cost(OrderSide::Sell, "SPY", 100.0, 100.0);
        assert_eq!(buy.commission, 0.0);
        assert!((sell.commission - 1.0).abs() < 1e-10);
    }

    #[test]
    fn fixed_bps_slippage() {
        let model = CostModel::bps(0.0, 10.0);
        let cost = model.cost(OrderSide::Sell, "SPY", -100.0, 100.0);
        // 10_000 notional * 10 bps = 10
        assert!((cost.slippage_cost - 10.0).abs() < 1e-10);
    }

    #[test]
    fn square_root_impact_scales_with_participation() {
        let mut overrides = BTreeMap::new();
        overrides.insert("ILLQ".to_string(), 10_000.0);
        let model = CostModel::new(
            CommissionModel::default(),
            SlippageModel::SquareRoot {
                coefficient: 0.1,
                daily_volume: 1_000_000.0,
                volume_overrides: overrides,
            },
        );
        // 10_000 shares of 1M: sqrt(0.01) = 0.1 → 0.1 * 0.1 * 100_000 = 1_000
        let liquid = model.cost(OrderSide::Buy, "SPY", 10_000.0, 10.0);
        assert!((liquid.slippage_cost - 1_000.0).abs() < 1e-9);
        // Same order against 10k volume: sqrt(1) = 1 → 10_000
        let illiquid = model.cost(OrderSide::Buy, "ILLQ", 10_000.0, 10.0);
        assert!((illiquid.slippage_cost - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn identical_inputs_identical_outputs() {
        let model = CostModel::bps(3.0, 7.0);
        let a = model.cost(OrderSide::Buy, "SPY", 123.0, 456.7);
        let b = model.cost(OrderSide::Buy, "SPY", 123.0, 456.7);
        assert_eq!(a, b);
    }

    #[test]
    fn validate_rejects_negative_and_nan() {
        assert!(CostModel::bps(-1.0, 0.0).validate().is_err());
        assert!(CostModel::bps(0.0, f64::NAN).validate().is_err());
        let bad_volume = CostModel::new(
            CommissionModel::default(),
            SlippageModel::SquareRoot {
                coefficient: 0.1,
                daily_volume: 0.0,
                volume_overrides: BTreeMap::new(),
            },
        );
        assert!(bad_volume.validate().is_err());
        assert!(CostModel::bps(1.0, 2.0).validate().is_ok());
    }

    #[test]
    fn deserializes_from_tagged_toml_shape() {
        let json = r#"{"commission":{"rate":0.001},"slippage":{"type":"fixed_bps","bps":5.0}}"#;
        let model: CostModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.slippage, SlippageModel::FixedBps { bps: 5.0 });
        assert_eq!(model.commission.min_per_share, 0.0);
    }
}
