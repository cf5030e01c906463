//! Drawdown tracker — peak-to-trough episodes over an equity series.
//!
//! Single pass over the ordered points. A point is underwater while its
//! drawdown is below zero; an episode starts on the first underwater point
//! after a peak, its trough is the deepest point of the contiguous run, and it
//! closes on the first point back at or above the pre-drawdown peak. Episodes
//! still underwater at the end of the series stay open.
//!
//! Durations count trading-day observations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::TimeseriesPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEpisode {
    pub start_date: NaiveDate,
    pub trough_date: NaiveDate,
    /// First date back at the prior peak; `None` while still open.
    pub end_date: Option<NaiveDate>,
    /// Minimum drawdown within the episode (negative fraction).
    pub depth: f64,
    /// Observations from start to end inclusive (or to series end if open).
    pub duration_days: usize,
    /// Observations from trough to end; `None` while still open.
    pub recovery_days: Option<usize>,
}

impl DrawdownEpisode {
    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

#[derive(Debug, Clone)]
struct OpenEpisode {
    start_index: usize,
    start_date: NaiveDate,
    trough_index: usize,
    trough_date: NaiveDate,
    depth: f64,
}

/// Streaming episode detector.
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    index: usize,
    last_date: Option<NaiveDate>,
    current: Option<OpenEpisode>,
    closed: Vec<DrawdownEpisode>,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next observation's drawdown (`value / running_peak - 1`).
    pub fn push(&mut self, date: NaiveDate, drawdown: f64) {
        let i = self.index;
        self.index += 1;
        self.last_date = Some(date);

        if drawdown < 0.0 {
            match self.current.as_mut() {
                Some(ep) => {
                    if drawdown < ep.depth {
                        ep.depth = drawdown;
                        ep.trough_index = i;
                        ep.trough_date = date;
                    }
                }
                None => {
                    self.current = Some(OpenEpisode {
                        start_index: i,
                        start_date: date,
                        trough_index: i,
                        trough_date: date,
                        depth: drawdown,
                    });
                }
            }
        } else if let Some(ep) = self.current.take() {
            self.closed.push(DrawdownEpisode {
                start_date: ep.start_date,
                trough_date: ep.trough_date,
                end_date: Some(date),
                depth: ep.depth,
                duration_days: i - ep.start_index + 1,
                recovery_days: Some(i - ep.trough_index),
            });
        }
    }

    /// All episodes: closed ones in order, then the open one if any.
    pub fn finish(mut self) -> Vec<DrawdownEpisode> {
        if let Some(ep) = self.current.take() {
            self.closed.push(DrawdownEpisode {
                start_date: ep.start_date,
                trough_date: ep.trough_date,
                end_date: None,
                depth: ep.depth,
                duration_days: self.index - ep.start_index,
                recovery_days: None,
            });
        }
        self.closed
    }
}

/// Episodes recomputed from a persisted equity curve.
pub fn drawdown_episodes(points: &[TimeseriesPoint]) -> Vec<DrawdownEpisode> {
    let mut tracker = DrawdownTracker::new();
    for p in points {
        tracker.push(p.date, p.drawdown);
    }
    tracker.finish()
}

/// Drawdown series `value / running_peak - 1` for a raw value curve.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 {
                (v / peak - 1.0).min(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Rank episodes: deepest first, then longer, then earlier start.
pub fn top_episodes(mut episodes: Vec<DrawdownEpisode>, n: usize) -> Vec<DrawdownEpisode> {
    episodes.sort_by(|a, b| {
        a.depth
            .total_cmp(&b.depth)
            .then_with(|| b.duration_days.cmp(&a.duration_days))
            .then_with(|| a.start_date.cmp(&b.start_date))
    });
    episodes.truncate(n);
    episodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn episodes_for(values: &[f64]) -> Vec<DrawdownEpisode> {
        let mut tracker = DrawdownTracker::new();
        for (i, dd) in drawdown_series(values).into_iter().enumerate() {
            tracker.push(d(i as u32 + 1), dd);
        }
        tracker.finish()
    }

    #[test]
    fn open_episode_when_not_recovered() {
        let eps = episodes_for(&[100.0, 102.0, 99.0, 95.0, 101.0]);
        assert_eq!(eps.len(), 1);
        let ep = &eps[0];
        assert_eq!(ep.start_date, d(3));
        assert_eq!(ep.trough_date, d(4));
        assert!((ep.depth - (95.0 / 102.0 - 1.0)).abs() < 1e-12);
        assert!(ep.is_open());
        assert_eq!(ep.duration_days, 3);
        assert_eq!(ep.recovery_days, None);
    }

    #[test]
    fn closes_on_return_to_peak() {
        let eps = episodes_for(&[100.0, 90.0, 80.0, 95.0, 100.0, 105.0]);
        assert_eq!(eps.len(), 1);
        let ep = &eps[0];
        assert_eq!(ep.start_date, d(2));
        assert_eq!(ep.trough_date, d(3));
        assert_eq!(ep.end_date, Some(d(5)));
        assert_eq!(ep.duration_days, 4);
        assert_eq!(ep.recovery_days, Some(2));
        assert!((ep.depth + 0.2).abs() < 1e-12);
    }

    #[test]
    fn multiple_episodes() {
        let eps = episodes_for(&[100.0, 95.0, 100.0, 110.0, 99.0, 111.0, 100.0]);
        assert_eq!(eps.len(), 3);
        assert!(!eps[0].is_open());
        assert!(!eps[1].is_open());
        assert!(eps[2].is_open());
    }

    #[test]
    fn monotonic_series_has_no_episodes() {
        assert!(episodes_for(&[1.0, 2.0, 3.0]).is_empty());
        assert!(episodes_for(&[]).is_empty());
    }

    #[test]
    fn ranking_depth_then_duration_then_start() {
        let make = |start: u32, depth: f64, duration: usize| DrawdownEpisode {
            start_date: d(start),
            trough_date: d(start),
            end_date: None,
            depth,
            duration_days: duration,
            recovery_days: None,
        };
        let ranked = top_episodes(
            vec![
                make(1, -0.05, 3),
                make(2, -0.10, 2),
                make(3, -0.10, 5),
                make(4, -0.10, 5),
            ],
            3,
        );
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].start_date, d(3));
        assert_eq!(ranked[1].start_date, d(4));
        assert_eq!(ranked[2].start_date, d(2));
    }

    #[test]
    fn drawdown_series_is_never_positive() {
        let dd = drawdown_series(&[100.0, 120.0, 90.0, 130.0]);
        assert!(dd.iter().all(|&x| x <= 0.0));
        assert!((dd[2] - (-0.25)).abs() < 1e-12);
        assert_eq!(dd[3], 0.0);
    }
}
