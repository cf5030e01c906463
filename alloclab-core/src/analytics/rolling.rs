//! Rolling metrics engine.
//!
//! Returns are taken between consecutive points, so a series of `n` points
//! carries `n - 1` return observations and a window of `W` first completes at
//! index `W`. Each emitted point covers the trailing `W` returns and the `W`
//! points they end on; the return base (the point just before the window)
//! seeds the re-based peak for the in-window drawdown.
//!
//! Sums are maintained incrementally over a bounded deque. The in-window max
//! drawdown rescans the deque, and so does the variance when the streamed
//! value is too close to zero to trust: adding and removing returns leaves
//! rounding residue in the running sums, and a window of exactly zero returns
//! must report zero volatility.

use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::TimeseriesPoint;
use crate::error::EngineError;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Variances below this are treated as exactly zero.
const VARIANCE_FLOOR: f64 = 1e-18;

/// Streamed variance at or below this fraction of the mean square is
/// recomputed from the buffer.
const RESCAN_RELATIVE: f64 = 1e-10;

/// Streamed daily variance below this is recomputed from the buffer.
const RESCAN_ABSOLUTE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingMetricPoint {
    pub date: NaiveDate,
    pub window_days: usize,
    pub rolling_return: f64,
    pub rolling_volatility: f64,
    /// `None` when the window has zero volatility.
    pub rolling_sharpe: Option<f64>,
    /// Deepest decline inside the window (≤ 0).
    pub rolling_max_drawdown: f64,
    pub turnover_sum: f64,
    pub commission_sum: f64,
    pub slippage_cost_sum: f64,
    pub n_trades_sum: u64,
    pub gross_exposure_avg: f64,
    pub net_exposure_avg: f64,
}

#[derive(Debug, Clone, Copy)]
struct Obs {
    ret: f64,
    value: f64,
    turnover: f64,
    commission: f64,
    slippage_cost: f64,
    n_trades: u64,
    gross_exposure: f64,
    net_exposure: f64,
}

impl Obs {
    fn from_point(p: &TimeseriesPoint, ret: f64) -> Self {
        Self {
            ret,
            value: p.portfolio_value,
            turnover: p.turnover,
            commission: p.commission,
            slippage_cost: p.slippage_cost,
            n_trades: u64::from(p.n_trades),
            gross_exposure: p.gross_exposure,
            net_exposure: p.net_exposure,
        }
    }
}

/// Streaming window over `TimeseriesPoint`s.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    window: usize,
    risk_free_rate: f64,
    base_value: Option<f64>,
    buf: VecDeque<Obs>,
    sum_ret: f64,
    sum_ret_sq: f64,
    sum_log_growth: f64,
    wipeouts: usize,
    turnover: f64,
    commission: f64,
    slippage_cost: f64,
    n_trades: u64,
    gross_exposure: f64,
    net_exposure: f64,
}

impl RollingWindow {
    pub fn new(window: usize, risk_free_rate: f64) -> Result<Self, EngineError> {
        if window < 2 {
            return Err(EngineError::Configuration(format!(
                "rolling window must be at least 2 days, got {window}"
            )));
        }
        if !risk_free_rate.is_finite() {
            return Err(EngineError::Configuration(
                "risk-free rate must be finite".into(),
            ));
        }
        Ok(Self {
            window,
            risk_free_rate,
            base_value: None,
            buf: VecDeque::with_capacity(window + 1),
            sum_ret: 0.0,
            sum_ret_sq: 0.0,
            sum_log_growth: 0.0,
            wipeouts: 0,
            turnover: 0.0,
            commission: 0.0,
            slippage_cost: 0.0,
            n_trades: 0,
            gross_exposure: 0.0,
            net_exposure: 0.0,
        })
    }

    pub fn window_days(&self) -> usize {
        self.window
    }

    /// Feed the next point; returns a metric once the window is full.
    pub fn push(&mut self, point: &TimeseriesPoint) -> Option<RollingMetricPoint> {
        let Some(prev) = self.buf.back().map(|o| o.value).or(self.base_value) else {
            // First point: return base only.
            self.base_value = Some(point.portfolio_value);
            return None;
        };
        let ret = if prev > 0.0 {
            point.portfolio_value / prev - 1.0
        } else {
            0.0
        };

        let obs = Obs::from_point(point, ret);
        self.add(&obs);
        self.buf.push_back(obs);

        if self.buf.len() > self.window {
            if let Some(old) = self.buf.pop_front() {
                self.remove(&old);
                self.base_value = Some(old.value);
            }
        }

        (self.buf.len() == self.window).then(|| self.snapshot(point.date))
    }

    fn add(&mut self, o: &Obs) {
        self.sum_ret += o.ret;
        self.sum_ret_sq += o.ret * o.ret;
        if o.ret <= -1.0 {
            self.wipeouts += 1;
        } else {
            self.sum_log_growth += o.ret.ln_1p();
        }
        self.turnover += o.turnover;
        self.commission += o.commission;
        self.slippage_cost += o.slippage_cost;
        self.n_trades += o.n_trades;
        self.gross_exposure += o.gross_exposure;
        self.net_exposure += o.net_exposure;
    }

    fn remove(&mut self, o: &Obs) {
        self.sum_ret -= o.ret;
        self.sum_ret_sq -= o.ret * o.ret;
        if o.ret <= -1.0 {
            self.wipeouts -= 1;
        } else {
            self.sum_log_growth -= o.ret.ln_1p();
        }
        self.turnover -= o.turnover;
        self.commission -= o.commission;
        self.slippage_cost -= o.slippage_cost;
        self.n_trades -= o.n_trades;
        self.gross_exposure -= o.gross_exposure;
        self.net_exposure -= o.net_exposure;
    }

    fn snapshot(&self, date: NaiveDate) -> RollingMetricPoint {
        let w = self.window as f64;

        let rolling_return = if self.wipeouts > 0 {
            -1.0
        } else {
            self.sum_log_growth.exp_m1()
        };

        let variance = self.variance();
        let daily_vol = if variance > VARIANCE_FLOOR {
            variance.sqrt()
        } else {
            0.0
        };
        let rolling_volatility = daily_vol * TRADING_DAYS_PER_YEAR.sqrt();

        let annualized = annualize(rolling_return, self.window);
        let rolling_sharpe = (rolling_volatility > 0.0)
            .then(|| (annualized - self.risk_free_rate) / rolling_volatility);

        RollingMetricPoint {
            date,
            window_days: self.window,
            rolling_return,
            rolling_volatility,
            rolling_sharpe,
            rolling_max_drawdown: self.window_drawdown(),
            turnover_sum: self.turnover.max(0.0),
            commission_sum: self.commission.max(0.0),
            slippage_cost_sum: self.slippage_cost.max(0.0),
            n_trades_sum: self.n_trades,
            gross_exposure_avg: self.gross_exposure / w,
            net_exposure_avg: self.net_exposure / w,
        }
    }

    /// Sample variance of the window's daily returns.
    fn variance(&self) -> f64 {
        let w = self.window as f64;
        let mean = self.sum_ret / w;
        let streamed = (self.sum_ret_sq - w * mean * mean) / (w - 1.0);
        if streamed > RESCAN_ABSOLUTE && streamed > RESCAN_RELATIVE * (self.sum_ret_sq / w) {
            return streamed;
        }
        // Two passes over the buffer: O(W), only near zero.
        let mean = self.buf.iter().map(|o| o.ret).sum::<f64>() / w;
        self.buf.iter().map(|o| (o.ret - mean).powi(2)).sum::<f64>() / (w - 1.0)
    }

    fn window_drawdown(&self) -> f64 {
        let mut peak = self.base_value.unwrap_or(f64::NEG_INFINITY);
        let mut worst = 0.0_f64;
        for o in &self.buf {
            peak = peak.max(o.value);
            if peak > 0.0 {
                worst = worst.min(o.value / peak - 1.0);
            }
        }
        worst
    }
}

/// Geometric annualization of a return earned over `days` trading days.
pub fn annualize(total_return: f64, days: usize) -> f64 {
    if days == 0 || total_return <= -1.0 {
        return total_return.max(-1.0);
    }
    (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / days as f64) - 1.0
}

/// Full rolling series for one window size.
///
/// A window at least as long as the series yields no points.
pub fn rolling_metrics(
    points: &[TimeseriesPoint],
    window_days: usize,
    risk_free_rate: f64,
) -> Result<Vec<RollingMetricPoint>, EngineError> {
    let mut window = RollingWindow::new(window_days, risk_free_rate)?;
    Ok(points.iter().filter_map(|p| window.push(p)).collect())
}
