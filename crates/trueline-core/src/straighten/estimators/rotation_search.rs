//! Rotation search.
//!
//! Scores candidate corrections across the window by how well the edge
//! field would line up with the image axes after rotating by each one, then
//! refines around the best coarse candidate.

use rayon::prelude::*;

use super::{AngleEstimate, Diagnostics, EstimatorKind};
use crate::straighten::edges::EdgeField;
use crate::straighten::tunables::{
    apply_penalties, first_match, SearchMetrics, SEARCH_ALIGN_SIGMA_DEG, SEARCH_CEILING,
    SEARCH_COARSE_STEP_DEG, SEARCH_FINE_SPAN_DEG, SEARCH_FINE_STEP_DEG, SEARCH_PENALTIES,
    SEARCH_PEAK_PROMINENCE, SEARCH_TIERS,
};

/// Samples this far outside the window still pull on candidates near its edge.
const VOTE_MARGIN_DEG: f64 = 3.0 * SEARCH_ALIGN_SIGMA_DEG;

pub fn estimate(field: &EdgeField, window: f64) -> AngleEstimate {
    let votes: Vec<(f64, f64)> = field
        .samples
        .iter()
        .map(|s| (s.deviation(), s.vote()))
        .filter(|&(dev, w)| dev.abs() <= window + VOTE_MARGIN_DEG && w > 0.0)
        .collect();
    if votes.is_empty() || window <= 0.0 {
        return AngleEstimate::empty(EstimatorKind::RotationSearch);
    }

    let steps = (2.0 * window / SEARCH_COARSE_STEP_DEG).round() as i64;
    let coarse: Vec<(f64, f64)> = (0..=steps)
        .into_par_iter()
        .map(|i| {
            let angle = -window + i as f64 * SEARCH_COARSE_STEP_DEG;
            (angle, alignment_score(&votes, angle))
        })
        .collect();

    let (coarse_angle, coarse_best) = best_of(&coarse);
    let mean = coarse.iter().map(|&(_, s)| s).sum::<f64>() / coarse.len() as f64;

    let fine_steps = (SEARCH_FINE_SPAN_DEG / SEARCH_FINE_STEP_DEG).round() as i64;
    let fine: Vec<(f64, f64)> = (-fine_steps..=fine_steps)
        .map(|k| (coarse_angle + k as f64 * SEARCH_FINE_STEP_DEG).clamp(-window, window))
        .map(|angle| (angle, alignment_score(&votes, angle)))
        .collect();
    let (angle, best) = best_of(&fine);

    let zero_score = alignment_score(&votes, 0.0);
    let metrics = SearchMetrics {
        angle,
        improvement: best / zero_score.max(1e-9),
        peak_ratio: if mean > 0.0 { coarse_best / mean } else { 0.0 },
        peak_count: count_peaks(&coarse, coarse_best),
    };

    let tier = first_match(SEARCH_TIERS, &metrics);
    let base = tier.map_or(0.0, |t| t.value);
    let confidence = (base * apply_penalties(SEARCH_PENALTIES, &metrics)).min(SEARCH_CEILING);

    AngleEstimate {
        method: EstimatorKind::RotationSearch,
        angle_degrees: angle,
        confidence,
        support: votes.len(),
        diagnostics: Diagnostics::RotationSearch {
            improvement: metrics.improvement,
            peak_ratio: metrics.peak_ratio,
            peak_count: metrics.peak_count,
            tier: tier.map_or("none", |t| t.label).to_string(),
        },
    }
}

/// Weighted alignment of the edge deviations with a candidate correction.
fn alignment_score(votes: &[(f64, f64)], candidate: f64) -> f64 {
    let denom = 2.0 * SEARCH_ALIGN_SIGMA_DEG * SEARCH_ALIGN_SIGMA_DEG;
    votes
        .iter()
        .map(|&(dev, w)| {
            let d = dev - candidate;
            w * (-d * d / denom).exp()
        })
        .sum()
}

/// First maximum of a score curve.
fn best_of(curve: &[(f64, f64)]) -> (f64, f64) {
    curve
        .iter()
        .copied()
        .fold((0.0, f64::NEG_INFINITY), |best, c| if c.1 > best.1 { c } else { best })
}

/// Local maxima that reach the prominence fraction of the best score.
fn count_peaks(curve: &[(f64, f64)], best: f64) -> usize {
    let floor = best * SEARCH_PEAK_PROMINENCE;
    let n = curve.len();
    (0..n)
        .filter(|&i| {
            let s = curve[i].1;
            let left = if i > 0 { curve[i - 1].1 } else { f64::NEG_INFINITY };
            let right = if i + 1 < n { curve[i + 1].1 } else { f64::NEG_INFINITY };
            s >= floor && s > left && s >= right
        })
        .count()
}
