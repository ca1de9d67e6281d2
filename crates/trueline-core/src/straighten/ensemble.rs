//! Ensemble combiner.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::estimators::AngleEstimate;
use super::tunables::{AGREEMENT_BONUS, AGREEMENT_TOLERANCE_DEG, COMBINE_CEILING, COMBINE_FLOOR};

/// Combined estimate before limiting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub angle_degrees: f64,
    pub confidence: f64,
    /// Size of the winning cohort (0 when nothing survived the floor).
    pub agreeing: usize,
}

/// Combine estimator outputs by agreement.
///
/// Estimates under the confidence floor are dropped. Each survivor forms a
/// cohort with every survivor within tolerance of it; the largest cohort
/// wins, ties going to the higher mean confidence. The angle is the
/// confidence-weighted mean of the cohort, the confidence the average of its
/// maximum and mean plus an agreement bonus, capped.
pub fn combine(estimates: &[AngleEstimate]) -> EnsembleResult {
    let survivors: Vec<&AngleEstimate> = estimates
        .iter()
        .filter(|e| e.confidence >= COMBINE_FLOOR && e.angle_degrees.is_finite())
        .collect();
    if survivors.is_empty() {
        debug!("no estimator cleared the confidence floor");
        return EnsembleResult::default();
    }

    let mut best: Option<(Vec<&AngleEstimate>, f64)> = None;
    for anchor in &survivors {
        let cohort: Vec<&AngleEstimate> = survivors
            .iter()
            .copied()
            .filter(|e| (e.angle_degrees - anchor.angle_degrees).abs() <= AGREEMENT_TOLERANCE_DEG)
            .collect();
        let mean = cohort.iter().map(|e| e.confidence).sum::<f64>() / cohort.len() as f64;
        let better = match &best {
            None => true,
            Some((current, current_mean)) => {
                cohort.len() > current.len() || (cohort.len() == current.len() && mean > *current_mean)
            }
        };
        if better {
            best = Some((cohort, mean));
        }
    }
    let Some((cohort, mean)) = best else {
        return EnsembleResult::default();
    };

    let weight: f64 = cohort.iter().map(|e| e.confidence).sum();
    let angle = cohort
        .iter()
        .map(|e| e.angle_degrees * e.confidence)
        .sum::<f64>()
        / weight;
    let max = cohort.iter().map(|e| e.confidence).fold(0.0, f64::max);
    let bonus = AGREEMENT_BONUS
        .get(cohort.len())
        .copied()
        .unwrap_or(AGREEMENT_BONUS[AGREEMENT_BONUS.len() - 1]);
    let confidence = ((max + mean) / 2.0 + bonus).min(COMBINE_CEILING);

    debug!(
        angle,
        confidence,
        agreeing = cohort.len(),
        methods = ?cohort.iter().map(|e| e.method.name()).collect::<Vec<_>>(),
        "ensemble combined"
    );

    EnsembleResult {
        angle_degrees: angle,
        confidence,
        agreeing: cohort.len(),
    }
}
