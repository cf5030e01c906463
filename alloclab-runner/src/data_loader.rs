//! CSV loading for prices and signals.
//!
//! - `prices.csv`: `date,symbol,open,close`
//! - `signals.csv`: `date,symbol,target_weight`
//!
//! Dates are ISO `YYYY-MM-DD`. Rows may come in any order. Missing rows stay
//! missing: the engine sees them as `PriceLookup::Missing`, never as zero.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use alloclab_core::data::{InMemoryPrices, InMemorySignals};
use alloclab_core::domain::{DailyBar, Signal};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("duplicate {what} for {symbol} on {date}")]
    Duplicate {
        what: &'static str,
        symbol: String,
        date: NaiveDate,
    },

    #[error("empty symbol on row {row}")]
    EmptySymbol { row: usize },
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    symbol: String,
    open: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    date: NaiveDate,
    symbol: String,
    target_weight: f64,
}

pub fn load_prices(path: &Path) -> Result<InMemoryPrices, LoadError> {
    let prices = read_prices(open(path)?)?;
    info!(path = %path.display(), symbols = prices.symbols().count(), "loaded prices");
    Ok(prices)
}

pub fn load_signals(path: &Path) -> Result<InMemorySignals, LoadError> {
    let signals = read_signals(open(path)?)?;
    info!(path = %path.display(), records = signals.len(), "loaded signals");
    Ok(signals)
}

pub fn read_prices<R: Read>(reader: R) -> Result<InMemoryPrices, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut prices = InMemoryPrices::new();
    let mut seen = HashSet::new();
    for (i, row) in rdr.deserialize::<PriceRow>().enumerate() {
        let row = row?;
        let symbol = checked_symbol(row.symbol, i + 1)?;
        if !seen.insert((symbol.clone(), row.date)) {
            return Err(LoadError::Duplicate {
                what: "price",
                symbol,
                date: row.date,
            });
        }
        prices.insert(symbol, DailyBar::new(row.date, row.open, row.close));
    }
    Ok(prices)
}

pub fn read_signals<R: Read>(reader: R) -> Result<InMemorySignals, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut signals = Vec::new();
    let mut seen = HashSet::new();
    for (i, row) in rdr.deserialize::<SignalRow>().enumerate() {
        let row = row?;
        let symbol = checked_symbol(row.symbol, i + 1)?;
        if !seen.insert((symbol.clone(), row.date)) {
            return Err(LoadError::Duplicate {
                what: "signal",
                symbol,
                date: row.date,
            });
        }
        signals.push(Signal {
            date: row.date,
            symbol,
            target_weight: row.target_weight,
        });
    }
    signals.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));
    Ok(InMemorySignals::new(signals))
}

fn open(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn checked_symbol(symbol: String, row: usize) -> Result<String, LoadError> {
    if symbol.is_empty() {
        return Err(LoadError::EmptySymbol { row });
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloclab_core::data::{PriceSource, SignalSource};
    use alloclab_core::domain::PriceLookup;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn reads_prices_in_any_order() {
        let csv = "date,symbol,open,close\n\
                   2024-05-02,SPY,101.0,102.0\n\
                   2024-05-01, SPY ,100.0,100.5\n\
                   2024-05-01,TLT,90.0,91.0\n";
        let prices = read_prices(csv.as_bytes()).unwrap();
        assert_eq!(prices.trading_days(d(1), d(31)), vec![d(1), d(2)]);
        assert_eq!(prices.bar("SPY", d(1)).open(), Some(100.0));
        assert_eq!(prices.bar("TLT", d(2)), PriceLookup::Missing);
    }

    #[test]
    fn duplicate_price_rows_rejected() {
        let csv = "date,symbol,open,close\n2024-05-01,SPY,1,1\n2024-05-01,SPY,2,2\n";
        assert!(matches!(
            read_prices(csv.as_bytes()),
            Err(LoadError::Duplicate { what: "price", .. })
        ));
    }

    #[test]
    fn malformed_number_is_csv_error() {
        let csv = "date,symbol,open,close\n2024-05-01,SPY,abc,1\n";
        assert!(matches!(read_prices(csv.as_bytes()), Err(LoadError::Csv(_))));
    }

    #[test]
    fn reads_signals_sorted() {
        let csv = "date,symbol,target_weight\n\
                   2024-05-03,SPY,0.6\n\
                   2024-05-01,TLT,0.4\n\
                   2024-05-01,SPY,0.5\n";
        let signals = read_signals(csv.as_bytes()).unwrap();
        let all = signals.signals_between(d(1), d(31));
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].symbol, "SPY");
        assert_eq!(all[0].date, d(1));
        assert_eq!(all[2].date, d(3));
    }

    #[test]
    fn empty_symbol_rejected() {
        let csv = "date,symbol,target_weight\n2024-05-01,,0.5\n";
        assert!(matches!(
            read_signals(csv.as_bytes()),
            Err(LoadError::EmptySymbol { row: 1 })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_prices(Path::new("/nonexistent/prices.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
