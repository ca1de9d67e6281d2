//! Histogram voting.
//!
//! Edge deviations vote into fine bins across the window. A spatial grid
//! caps how much any one cell can contribute, so a single busy texture
//! cannot outvote the rest of the frame. Partial histograms are built per
//! sample block in parallel and merged in block order.

use rayon::prelude::*;

use super::{AngleEstimate, Diagnostics, EstimatorKind};
use crate::straighten::edges::{EdgeField, EdgeSample};
use crate::straighten::tunables::{
    apply_penalties, first_match, VoteMetrics, VOTE_BIN_DEG, VOTE_BORDER_CELL_CAP,
    VOTE_BORDER_SUPPORT_MIN, VOTE_CEILING_WITHOUT_BORDER, VOTE_CEILING_WITH_BORDER,
    VOTE_GRID_CELLS, VOTE_INTERIOR_CELL_CAP, VOTE_PEAK_HALF_WIDTH_DEG, VOTE_PENALTIES,
    VOTE_REFINE_HALF_WIDTH_DEG, VOTE_SMOOTHING, VOTE_TIERS,
};

const BLOCK_SAMPLES: usize = 4096;

struct Vote {
    deviation: f64,
    mass: f64,
    border: bool,
}

pub fn estimate(field: &EdgeField, window: f64) -> AngleEstimate {
    let in_window: Vec<&EdgeSample> = field
        .samples
        .iter()
        .filter(|s| s.deviation().abs() < window && s.weight > 0.0)
        .collect();
    if in_window.is_empty() || window <= 0.0 {
        return AngleEstimate::empty(EstimatorKind::HistogramVote);
    }

    let votes = capped_votes(field, &in_window);
    let bins = (2.0 * window / VOTE_BIN_DEG).round().max(1.0) as usize;
    let bin_of = |dev: f64| (((dev + window) / VOTE_BIN_DEG).floor().max(0.0) as usize).min(bins - 1);

    let partials: Vec<Vec<f64>> = votes
        .par_chunks(BLOCK_SAMPLES)
        .map(|block| {
            let mut hist = vec![0.0; bins];
            for vote in block {
                hist[bin_of(vote.deviation)] += vote.mass;
            }
            hist
        })
        .collect();
    let mut histogram = vec![0.0; bins];
    for partial in &partials {
        for (total, v) in histogram.iter_mut().zip(partial) {
            *total += v;
        }
    }

    let total_mass: f64 = histogram.iter().sum();
    if total_mass <= 0.0 {
        return AngleEstimate::empty(EstimatorKind::HistogramVote);
    }

    let smoothed = smooth(&histogram);
    let peak_bin = smoothed
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0;
    let center = -window + (peak_bin as f64 + 0.5) * VOTE_BIN_DEG;
    let angle = refine(&votes, center);

    let mut peak_mass = 0.0;
    let mut border_mass = 0.0;
    for vote in votes
        .iter()
        .filter(|v| (v.deviation - angle).abs() <= VOTE_PEAK_HALF_WIDTH_DEG)
    {
        peak_mass += vote.mass;
        if vote.border {
            border_mass += vote.mass;
        }
    }

    let metrics = VoteMetrics {
        concentration: peak_mass / total_mass,
        total_mass,
        border_support: if peak_mass > 0.0 { border_mass / peak_mass } else { 0.0 },
    };
    let ceiling = if metrics.border_support >= VOTE_BORDER_SUPPORT_MIN {
        VOTE_CEILING_WITH_BORDER
    } else {
        VOTE_CEILING_WITHOUT_BORDER
    };
    let tier = first_match(VOTE_TIERS, &metrics);
    let base = tier.map_or(0.0, |t| t.value);
    let confidence = (base * apply_penalties(VOTE_PENALTIES, &metrics)).min(ceiling);

    AngleEstimate {
        method: EstimatorKind::HistogramVote,
        angle_degrees: angle.clamp(-window, window),
        confidence,
        support: in_window.len(),
        diagnostics: Diagnostics::HistogramVote {
            concentration: metrics.concentration,
            total_mass,
            border_support: metrics.border_support,
            tier: tier.map_or("none", |t| t.label).to_string(),
        },
    }
}

/// Position-weighted votes, scaled down in cells holding more than their cap.
fn capped_votes(field: &EdgeField, samples: &[&EdgeSample]) -> Vec<Vote> {
    let cells = VOTE_GRID_CELLS;
    let cell_of = |s: &EdgeSample| {
        let cx = (s.x as usize * cells / field.width.max(1) as usize).min(cells - 1);
        let cy = (s.y as usize * cells / field.height.max(1) as usize).min(cells - 1);
        (cx, cy)
    };

    let mut mass = vec![0.0; cells * cells];
    for s in samples {
        let (cx, cy) = cell_of(s);
        mass[cy * cells + cx] += s.weight;
    }
    let occupied = mass.iter().filter(|&&m| m > 0.0).count().max(1);
    let mean = mass.iter().sum::<f64>() / occupied as f64;

    let scale: Vec<f64> = mass
        .iter()
        .enumerate()
        .map(|(i, &m)| {
            let (cx, cy) = (i % cells, i / cells);
            let on_edge = cx == 0 || cy == 0 || cx == cells - 1 || cy == cells - 1;
            let cap = mean
                * if on_edge {
                    VOTE_BORDER_CELL_CAP
                } else {
                    VOTE_INTERIOR_CELL_CAP
                };
            if m > cap {
                cap / m
            } else {
                1.0
            }
        })
        .collect();

    samples
        .iter()
        .map(|s| {
            let (cx, cy) = cell_of(s);
            Vote {
                deviation: s.deviation(),
                mass: s.weight * scale[cy * cells + cx],
                border: s.band.is_border(),
            }
        })
        .collect()
}

fn smooth(histogram: &[f64]) -> Vec<f64> {
    let half = VOTE_SMOOTHING.len() as i64 / 2;
    let norm: f64 = VOTE_SMOOTHING.iter().sum();
    (0..histogram.len() as i64)
        .map(|i| {
            VOTE_SMOOTHING
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = i + k as i64 - half;
                    (j >= 0 && (j as usize) < histogram.len()).then(|| histogram[j as usize] * w)
                })
                .sum::<f64>()
                / norm
        })
        .collect()
}

/// Mass-weighted mean deviation near the peak bin.
fn refine(votes: &[Vote], center: f64) -> f64 {
    let (sum, mass) = votes
        .iter()
        .filter(|v| (v.deviation - center).abs() <= VOTE_REFINE_HALF_WIDTH_DEG)
        .fold((0.0, 0.0), |(sum, mass), v| (sum + v.deviation * v.mass, mass + v.mass));
    if mass > 0.0 {
        sum / mass
    } else {
        center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::straighten::estimators::test_support::{field, line, vertical};

    #[test]
    fn test_empty() {
        assert_eq!(
            estimate(&EdgeField::default(), 6.0),
            AngleEstimate::empty(EstimatorKind::HistogramVote)
        );
    }

    #[test]
    fn test_sharp_peak_with_border_support() {
        let mut samples = line(20.0, 10, 290, 3.0);
        samples.extend(line(390.0, 10, 290, 3.0));
        let estimate = estimate(&field(samples), 6.0);
        assert!((estimate.angle_degrees - 3.0).abs() < 1e-9);
        assert!((estimate.confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_interior_only_peak_is_capped_low() {
        let samples = line(200.0, 70, 230, 1.0);
        let estimate = estimate(&field(samples), 6.0);
        assert!((estimate.angle_degrees - 1.0).abs() < 1e-9);
        assert!((estimate.confidence - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_dominant_cell_is_capped() {
        // A dense texture in one interior cell at +4 deg, a sparse border
        // line at -1 deg. Without the cap the texture would win.
        let mut samples = Vec::new();
        for y in 160..180 {
            for x in 200..240 {
                samples.push(vertical(x, y, 4.0, 100.0));
            }
        }
        for y in (10..290).step_by(2) {
            samples.push(vertical(10, y, -1.0, 100.0));
            samples.push(vertical(390, y, -1.0, 100.0));
        }
        let capped = estimate(&field(samples), 6.0);
        assert!((capped.angle_degrees + 1.0).abs() < 1e-9, "{}", capped.angle_degrees);
    }

    #[test]
    fn test_sparse_penalty() {
        let samples: Vec<_> = (100..110).map(|y| vertical(200, y, 2.0, 100.0)).collect();
        let interior = estimate(&field(samples), 6.0);
        // Sharp (0.55) times sparse (0.6), above the interior ceiling of 0.20.
        assert!((interior.confidence - 0.20).abs() < 1e-9);
        let samples: Vec<_> = (100..110).map(|y| vertical(20, y, 2.0, 100.0)).collect();
        let border = estimate(&field(samples), 6.0);
        assert!((border.confidence - 0.33).abs() < 1e-9);
    }

    #[test]
    fn test_smooth_preserves_mass_in_interior() {
        let mut hist = vec![0.0; 11];
        hist[5] = 9.0;
        let out = smooth(&hist);
        assert_eq!(out[5], 3.0);
        assert_eq!(out[3], 1.0);
        assert!((out.iter().sum::<f64>() - 9.0).abs() < 1e-12);
    }
}
