//! Read-side analytics derived from an equity curve.

pub mod decimate;
pub mod drawdown;
pub mod rolling;

pub use decimate::{decimate, DecimatedSeries};
pub use drawdown::{drawdown_episodes, drawdown_series, top_episodes, DrawdownEpisode, DrawdownTracker};
pub use rolling::{annualize, rolling_metrics, RollingMetricPoint, RollingWindow, TRADING_DAYS_PER_YEAR};
