//! AllocLab Runner — run lifecycle, artifacts, and read paths.
//!
//! This crate builds on `alloclab-core` to provide:
//! - TOML run requests with validation
//! - Run lifecycle manager (queued → running → completed/failed), cancellation
//!   and parallel batch execution
//! - Summary metrics over a completed series
//! - Artifact stores (filesystem JSON/CSV/Parquet, in-memory)
//! - CSV loaders for prices and signals
//! - Read-side queries: status, summary, timeseries, rolling, drawdowns, trades

pub mod config;
pub mod data_loader;
pub mod lifecycle;
pub mod metrics;
pub mod query;
pub mod run;
pub mod store;

pub use config::{ConfigError, PolicySection, RunId, RunRequest, RunSection};
pub use data_loader::{load_prices, load_signals, LoadError};
pub use lifecycle::{LifecycleError, RunManager};
pub use metrics::BacktestSummary;
pub use query::{Page, QueryError, RunQueries, SeriesSource, MAX_PAGE_LIMIT};
pub use run::{BacktestRun, RunFailure, RunStatus};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoreError};
