//! Precomputed target weights produced upstream of the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One target weight for one symbol, sampled at the close of `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub date: NaiveDate,
    pub symbol: String,
    pub target_weight: f64,
}

/// All target weights for a single rebalance date.
///
/// A set is a complete target portfolio: symbols held but absent from the set
/// are targeted to zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalSet {
    pub date: NaiveDate,
    pub weights: BTreeMap<String, f64>,
}

impl SignalSet {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            weights: BTreeMap::new(),
        }
    }

    /// Gross leverage of the set: `Σ|w|`.
    pub fn gross_weight(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }

    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    /// Group flat signal records into per-date sets, ordered by date.
    ///
    /// A repeated `(date, symbol)` keeps the last record.
    pub fn group(signals: &[Signal]) -> Vec<SignalSet> {
        let mut by_date: BTreeMap<NaiveDate, SignalSet> = BTreeMap::new();
        for signal in signals {
            by_date
                .entry(signal.date)
                .or_insert_with(|| SignalSet::new(signal.date))
                .weights
                .insert(signal.symbol.clone(), signal.target_weight);
        }
        by_date.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn sig(day: u32, symbol: &str, w: f64) -> Signal {
        Signal {
            date: d(day),
            symbol: symbol.into(),
            target_weight: w,
        }
    }

    #[test]
    fn group_orders_sets_by_date() {
        let sets = SignalSet::group(&[sig(5, "SPY", 0.5), sig(4, "TLT", 0.4), sig(5, "TLT", 0.5)]);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].date, d(4));
        assert_eq!(sets[1].weights.len(), 2);
    }

    #[test]
    fn gross_weight_counts_shorts() {
        let sets = SignalSet::group(&[sig(4, "SPY", 0.7), sig(4, "QQQ", -0.3)]);
        assert!((sets[0].gross_weight() - 1.0).abs() < 1e-12);
        assert_eq!(sets[0].weight("IWM"), 0.0);
    }
}
