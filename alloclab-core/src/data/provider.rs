//! Provider traits and in-memory implementations.
//!
//! The engine never fetches data itself. Price and signal lookups go through
//! these traits so runs can be driven by files, a warehouse layer, or
//! deterministic fakes in tests. All reads happen before or during a run with
//! no suspension points.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{DailyBar, PriceLookup, Signal};

/// Daily price lookup over adjusted bars.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Trading sessions in `[start, end]`, ascending.
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;

    /// Bar for `symbol` on `date`, or the `Missing` sentinel.
    fn bar(&self, symbol: &str, date: NaiveDate) -> PriceLookup;
}

/// Precomputed target-weight lookup.
pub trait SignalSource: Send + Sync {
    /// All signals dated within `[start, end]`.
    fn signals_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<Signal>;
}

/// Price source backed by an in-memory map.
///
/// The trading calendar is the union of dates any symbol has a bar for.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPrices {
    bars: BTreeMap<String, BTreeMap<NaiveDate, DailyBar>>,
    calendar: BTreeSet<NaiveDate>,
}

impl InMemoryPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, bar: DailyBar) {
        self.calendar.insert(bar.date);
        self.bars.entry(symbol.into()).or_default().insert(bar.date, bar);
    }

    /// Build from `(symbol, bar)` pairs.
    pub fn from_bars<I, S>(bars: I) -> Self
    where
        I: IntoIterator<Item = (S, DailyBar)>,
        S: Into<String>,
    {
        let mut prices = Self::new();
        for (symbol, bar) in bars {
            prices.insert(symbol, bar);
        }
        prices
    }

    /// Register a session with no bars for any symbol.
    pub fn add_session(&mut self, date: NaiveDate) {
        self.calendar.insert(date);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(|s| s.as_str())
    }
}

impl PriceSource for InMemoryPrices {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }
        self.calendar.range(start..=end).copied().collect()
    }

    fn bar(&self, symbol: &str, date: NaiveDate) -> PriceLookup {
        self.bars
            .get(symbol)
            .and_then(|series| series.get(&date))
            .copied()
            .into()
    }
}

/// Signal source backed by a vector of records.
#[derive(Debug, Clone, Default)]
pub struct InMemorySignals {
    signals: Vec<Signal>,
}

impl InMemorySignals {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self { signals }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl SignalSource for InMemorySignals {
    fn signals_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<Signal> {
        self.signals
            .iter()
            .filter(|s| s.date >= start && s.date <= end)
            .cloned()
            .collect()
    }
}
