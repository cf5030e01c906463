//! Daily price bar as supplied by the market-data layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Adjusted daily open/close for one symbol on one date.
///
/// Only the two prices the engine consumes are carried: orders fill at the
/// open, positions are marked at the close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
}

impl DailyBar {
    pub fn new(date: NaiveDate, open: f64, close: f64) -> Self {
        Self { date, open, close }
    }
}

/// Result of a `(symbol, date)` price lookup.
///
/// Providers must answer `Missing` instead of zero-filling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceLookup {
    Available(DailyBar),
    Missing,
}

impl PriceLookup {
    pub fn open(&self) -> Option<f64> {
        match self {
            PriceLookup::Available(bar) => Some(bar.open),
            PriceLookup::Missing => None,
        }
    }

    pub fn close(&self) -> Option<f64> {
        match self {
            PriceLookup::Available(bar) => Some(bar.close),
            PriceLookup::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PriceLookup::Missing)
    }
}

impl From<Option<DailyBar>> for PriceLookup {
    fn from(bar: Option<DailyBar>) -> Self {
        match bar {
            Some(bar) => PriceLookup::Available(bar),
            None => PriceLookup::Missing,
        }
    }
}
