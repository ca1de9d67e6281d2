//! Long line tracing.
//!
//! Follows ridges of vertical edge pixels down the image, keeps runs long
//! enough to be structure rather than texture, and fits each one with a
//! least-squares line.

use super::{AngleEstimate, Diagnostics, EstimatorKind};
use crate::straighten::edges::{Axis, EdgeField};
use crate::straighten::tunables::{
    LINE_ANGLE_TOLERANCE_DEG, LINE_CEILING, LINE_CONSISTENCY_SCALE_DEG, LINE_COUNT_SATURATION,
    LINE_FULL_LENGTH_FRACTION, LINE_INDEX_SLACK_DEG, LINE_MAX_GAP_ROWS, LINE_MAX_LINES,
    LINE_MIN_LENGTH_FRACTION, LINE_RIDGE_HALF_WIDTH, LINE_WEIGHTS,
};

const EMPTY: u32 = u32::MAX;

/// A traced and fitted run.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Line {
    /// Correction angle in degrees.
    angle: f64,
    /// Rows spanned.
    length: u32,
}

/// Dense lookup from pixel to candidate sample.
struct Grid<'a> {
    field: &'a EdgeField,
    cells: Vec<u32>,
    visited: Vec<bool>,
}

impl<'a> Grid<'a> {
    fn new(field: &'a EdgeField, window: f64) -> Self {
        let size = field.width as usize * field.height as usize;
        let mut cells = vec![EMPTY; size];
        for (i, s) in field.samples.iter().enumerate() {
            if s.axis() == Axis::Vertical && s.deviation().abs() <= window + LINE_INDEX_SLACK_DEG {
                cells[s.y as usize * field.width as usize + s.x as usize] = i as u32;
            }
        }
        Self {
            field,
            cells,
            visited: vec![false; size],
        }
    }

    fn slot(&self, x: i64, y: u32) -> Option<usize> {
        if x < 0 || x >= self.field.width as i64 || y >= self.field.height {
            return None;
        }
        Some(y as usize * self.field.width as usize + x as usize)
    }

    /// Index of an unvisited candidate sample at a pixel.
    fn open(&self, x: i64, y: u32) -> Option<usize> {
        let slot = self.slot(x, y)?;
        let idx = self.cells[slot];
        (idx != EMPTY && !self.visited[slot]).then_some(idx as usize)
    }

    /// Magnitude-weighted x of the ridge around `x`, consuming it.
    fn take_ridge(&mut self, x: i64, y: u32) -> f64 {
        let mut sum = 0.0;
        let mut mass = 0.0;
        for dx in -LINE_RIDGE_HALF_WIDTH..=LINE_RIDGE_HALF_WIDTH {
            let Some(slot) = self.slot(x + dx, y) else {
                continue;
            };
            let idx = self.cells[slot];
            if idx != EMPTY {
                let m = self.field.samples[idx as usize].magnitude;
                sum += (x + dx) as f64 * m;
                mass += m;
            }
            self.visited[slot] = true;
        }
        if mass > 0.0 {
            sum / mass
        } else {
            x as f64
        }
    }

    /// Trace one run downward from a seed sample.
    fn trace(&mut self, seed: usize) -> (Vec<(f64, f64)>, u32) {
        let s = self.field.samples[seed];
        let mut points = vec![(self.take_ridge(s.x as i64, s.y), s.y as f64)];
        let mut dev_sum = s.deviation();
        let mut x = s.x as i64;
        let (first, mut last) = (s.y, s.y);
        let mut gap = 0;
        let mut y = s.y + 1;

        while y < self.field.height {
            let mean = dev_sum / points.len() as f64;
            let next = (x - 1..=x + 1)
                .filter_map(|cx| self.open(cx, y).map(|idx| (cx, idx)))
                .filter(|&(_, idx)| {
                    (self.field.samples[idx].deviation() - mean).abs() <= LINE_ANGLE_TOLERANCE_DEG
                })
                .max_by(|a, b| {
                    let ma = self.field.samples[a.1].magnitude;
                    let mb = self.field.samples[b.1].magnitude;
                    ma.total_cmp(&mb)
                });
            match next {
                Some((cx, idx)) => {
                    x = cx;
                    points.push((self.take_ridge(cx, y), y as f64));
                    dev_sum += self.field.samples[idx].deviation();
                    last = y;
                    gap = 0;
                }
                None => {
                    gap += 1;
                    if gap > LINE_MAX_GAP_ROWS {
                        break;
                    }
                }
            }
            y += 1;
        }
        (points, last - first + 1)
    }
}

/// Slope `b` of the least-squares fit `x = a + b * y`.
fn fit_slope(points: &[(f64, f64)]) -> Option<f64> {
    let n = points.len() as f64;
    if n < 2.0 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut syy) = (0.0, 0.0);
    for &(x, y) in points {
        sxy += (x - mean_x) * (y - mean_y);
        syy += (y - mean_y) * (y - mean_y);
    }
    (syy > 0.0).then(|| sxy / syy)
}

pub fn estimate(field: &EdgeField, window: f64) -> AngleEstimate {
    if field.is_empty() || field.height == 0 {
        return AngleEstimate::empty(EstimatorKind::LongLine);
    }

    let min_length = (LINE_MIN_LENGTH_FRACTION * field.height as f64).ceil() as u32;
    let mut grid = Grid::new(field, window);
    let mut lines = Vec::new();

    for seed in 0..field.samples.len() {
        let s = &field.samples[seed];
        if grid.open(s.x as i64, s.y).is_none() {
            continue;
        }
        let (points, length) = grid.trace(seed);
        if length < min_length {
            continue;
        }
        let Some(slope) = fit_slope(&points) else {
            continue;
        };
        let angle = -slope.atan().to_degrees();
        if angle.abs() <= window {
            lines.push(Line { angle, length });
        }
    }

    if lines.is_empty() {
        return AngleEstimate::empty(EstimatorKind::LongLine);
    }
    // Stable: equal lengths keep discovery order.
    lines.sort_by(|a, b| b.length.cmp(&a.length));
    lines.truncate(LINE_MAX_LINES);

    let total: f64 = lines.iter().map(|l| l.length as f64).sum();
    let angle = lines.iter().map(|l| l.angle * l.length as f64).sum::<f64>() / total;
    let variance = lines
        .iter()
        .map(|l| (l.angle - angle).powi(2) * l.length as f64)
        .sum::<f64>()
        / total;
    let std_dev = variance.sqrt();
    let longest_fraction = lines[0].length as f64 / field.height as f64;

    let (w_count, w_consistency, w_length) = LINE_WEIGHTS;
    let count_score = (lines.len() as f64 / LINE_COUNT_SATURATION).min(1.0);
    let consistency_score = 1.0 / (1.0 + std_dev / LINE_CONSISTENCY_SCALE_DEG);
    let length_score = (longest_fraction / LINE_FULL_LENGTH_FRACTION).min(1.0);
    let confidence = LINE_CEILING
        * (w_count * count_score + w_consistency * consistency_score + w_length * length_score);

    AngleEstimate {
        method: EstimatorKind::LongLine,
        angle_degrees: angle,
        confidence: confidence.min(LINE_CEILING),
        support: lines.len(),
        diagnostics: Diagnostics::LongLine {
            line_count: lines.len(),
            std_dev,
            longest_fraction,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::straighten::estimators::test_support::{field, line, vertical};

    fn diagnostics(estimate: &AngleEstimate) -> (usize, f64, f64) {
        match estimate.diagnostics {
            Diagnostics::LongLine {
                line_count,
                std_dev,
                longest_fraction,
            } => (line_count, std_dev, longest_fraction),
            _ => (0, 0.0, 0.0),
        }
    }

    #[test]
    fn test_empty() {
        assert_eq!(
            estimate(&EdgeField::default(), 6.0),
            AngleEstimate::empty(EstimatorKind::LongLine)
        );
    }

    #[test]
    fn test_fit_slope() {
        let points: Vec<(f64, f64)> = (0..10).map(|y| (5.0 + 0.5 * y as f64, y as f64)).collect();
        assert!((fit_slope(&points).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(fit_slope(&[(1.0, 1.0)]), None);
        assert_eq!(fit_slope(&[(1.0, 1.0), (2.0, 1.0)]), None);
    }

    #[test]
    fn test_single_line() {
        let samples = line(100.0, 20, 280, 2.0);
        let estimate = estimate(&field(samples), 6.0);
        assert!((estimate.angle_degrees - 2.0).abs() < 0.05, "{}", estimate.angle_degrees);
        let (count, std_dev, longest) = diagnostics(&estimate);
        assert_eq!(count, 1);
        assert!(std_dev < 1e-12);
        assert!((longest - 260.0 / 300.0).abs() < 1e-9);
        // count 1/4, perfect consistency, full length credit
        let expected = 0.5 * (0.4 * 0.25 + 0.35 + 0.25);
        assert!((estimate.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_wide_ridge_traced_once() {
        let mut samples = line(100.0, 20, 280, -1.0);
        samples.extend(line(101.0, 20, 280, -1.0));
        let estimate = estimate(&field(samples), 6.0);
        assert_eq!(diagnostics(&estimate).0, 1);
        assert!((estimate.angle_degrees + 1.0).abs() < 0.05);
    }

    #[test]
    fn test_short_runs_rejected() {
        let samples = line(100.0, 20, 100, 2.0);
        assert_eq!(estimate(&field(samples), 6.0).confidence, 0.0);
    }

    #[test]
    fn test_gap_bridged() {
        let samples: Vec<_> = (20..280)
            .filter(|y| y % 3 != 0)
            .map(|y| vertical(150, y, 0.0, 200.0))
            .collect();
        let estimate = estimate(&field(samples), 6.0);
        assert_eq!(diagnostics(&estimate).0, 1);
        assert!(estimate.angle_degrees.abs() < 1e-9);
    }

    #[test]
    fn test_long_gap_splits() {
        let samples: Vec<_> = (20..280)
            .filter(|y| !(140..150).contains(y))
            .map(|y| vertical(150, y, 0.0, 200.0))
            .collect();
        let estimate = estimate(&field(samples), 6.0);
        // Runs of 120 and 130 rows, both above the 90-row minimum.
        assert_eq!(diagnostics(&estimate).0, 2);
    }

    #[test]
    fn test_inconsistent_pixels_not_followed() {
        let samples: Vec<_> = (20..280)
            .map(|y| vertical(150, y, if y < 60 { 0.0 } else { 5.0 }, 200.0))
            .collect();
        let estimate = estimate(&field(samples), 6.0);
        // The 0 deg head is too short on its own; the 5 deg tail qualifies.
        assert_eq!(diagnostics(&estimate).0, 1);
        assert!((diagnostics(&estimate).2 - 220.0 / 300.0).abs() < 1e-9);
    }
}
