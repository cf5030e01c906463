//! Tabular exports (CSV/Parquet) for external analysis tools.

use std::fs::File;
use std::path::Path;

use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter, Series};

use alloclab_core::domain::TimeseriesPoint;

use super::StoreError;

/// Header row from the serde field names; `None` fields are left empty.
pub(super) fn write_csv<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<(), StoreError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub(super) fn write_timeseries_parquet(
    path: &Path,
    points: &[TimeseriesPoint],
) -> Result<(), StoreError> {
    let f64_col = |name: &str, get: fn(&TimeseriesPoint) -> f64| {
        let values: Vec<f64> = points.iter().map(get).collect();
        Column::Series(Series::new(name.into(), values).into())
    };
    let dates: Vec<String> = points.iter().map(|p| p.date.to_string()).collect();
    let n_trades: Vec<u32> = points.iter().map(|p| p.n_trades).collect();
    let stale: Vec<bool> = points.iter().map(|p| p.stale_price).collect();

    let mut df = DataFrame::new(vec![
        Column::Series(Series::new("date".into(), dates).into()),
        f64_col("portfolio_value", |p| p.portfolio_value),
        f64_col("drawdown", |p| p.drawdown),
        f64_col("daily_return", |p| p.daily_return),
        f64_col("cumulative_return", |p| p.cumulative_return),
        f64_col("cash", |p| p.cash),
        f64_col("gross_exposure", |p| p.gross_exposure),
        f64_col("net_exposure", |p| p.net_exposure),
        f64_col("turnover", |p| p.turnover),
        f64_col("commission", |p| p.commission),
        f64_col("slippage_cost", |p| p.slippage_cost),
        Column::Series(Series::new("n_trades".into(), n_trades).into()),
        Column::Series(Series::new("stale_price".into(), stale).into()),
    ])?;

    let mut file = File::create(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}
