//! AllocLab Core — backtest execution and performance analytics.
//!
//! This crate is pure computation with no I/O:
//! - Domain types (signals, bars, orders, trades, timeseries points)
//! - Cost model with pluggable commission and slippage
//! - Execution scheduler: close-of-T signals fill at the next session's open
//! - Position ledger: cash, holdings, cost basis, daily mark-to-market
//! - Drawdown episodes, streaming rolling metrics, series decimation
//! - Provider traits for prices and signals, cancellation between sessions

pub mod analytics;
pub mod cancel;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;

pub use cancel::CancellationToken;
pub use error::{EngineError, ErrorKind};
