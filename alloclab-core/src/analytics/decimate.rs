//! Series decimator for the read path.
//!
//! Picks real observations at a uniform stride; never averages or
//! interpolates. First and last points are always kept.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimatedSeries<T> {
    pub points: Vec<T>,
    pub truncated: bool,
    pub total_points: usize,
}

/// Downsample `series` to at most `max_points` entries.
///
/// Input already within budget is returned unchanged.
pub fn decimate<T: Clone>(series: &[T], max_points: usize) -> Result<DecimatedSeries<T>, EngineError> {
    if max_points < 2 {
        return Err(EngineError::Configuration(format!(
            "max_points must be at least 2, got {max_points}"
        )));
    }
    let total = series.len();
    if total <= max_points {
        return Ok(DecimatedSeries {
            points: series.to_vec(),
            truncated: false,
            total_points: total,
        });
    }

    let stride = total.div_ceil(max_points);
    let last = total - 1;
    let mut points: Vec<T> = series.iter().step_by(stride).cloned().collect();
    // step_by may stop short of the tail
    if last % stride != 0 {
        if points.len() >= max_points {
            points.pop();
        }
        points.push(series[last].clone());
    }

    Ok(DecimatedSeries {
        points,
        truncated: true,
        total_points: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_passes_through() {
        let out = decimate(&[1, 2, 3], 5).unwrap();
        assert_eq!(out.points, vec![1, 2, 3]);
        assert!(!out.truncated);
        assert_eq!(out.total_points, 3);
    }

    #[test]
    fn keeps_endpoints_and_budget() {
        let input: Vec<u32> = (0..1000).collect();
        let out = decimate(&input, 7).unwrap();
        assert!(out.truncated);
        assert_eq!(out.total_points, 1000);
        assert!(out.points.len() <= 7);
        assert_eq!(out.points.first(), Some(&0));
        assert_eq!(out.points.last(), Some(&999));
    }

    #[test]
    fn uniform_stride() {
        let input: Vec<u32> = (0..10).collect();
        let out = decimate(&input, 5).unwrap();
        // stride 2, tail appended
        assert_eq!(out.points, vec![0, 2, 4, 6, 9]);
    }

    #[test]
    fn exact_multiple_lands_on_last() {
        let input: Vec<u32> = (0..7).collect();
        let out = decimate(&input, 4).unwrap();
        assert_eq!(out.points, vec![0, 2, 4, 6]);
    }

    #[test]
    fn rejects_small_budget() {
        assert!(decimate(&[1, 2, 3], 1).is_err());
    }

    #[test]
    fn empty_input() {
        let out = decimate::<u8>(&[], 3).unwrap();
        assert!(out.points.is_empty());
        assert!(!out.truncated);
    }
}
