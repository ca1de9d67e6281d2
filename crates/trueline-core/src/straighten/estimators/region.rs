//! Region analysis.
//!
//! Reads the vertical edges of the left strip, the right strip and the
//! central band separately, then trusts the answer according to which
//! regions agree with each other.

use super::{weighted_median, AngleEstimate, Diagnostics, EstimatorKind, RegionReading};
use crate::straighten::edges::{Axis, EdgeField, EdgeSample};
use crate::straighten::tunables::{
    AGREEMENT_TOLERANCE_DEG, REGION_AGREEMENT_FLOOR, REGION_AGREEMENT_SPAN,
    REGION_ALL_AGREE_CEILING, REGION_BORDERS_AGREE_CEILING, REGION_CENTER_BAND,
    REGION_MIN_SAMPLES, REGION_PAIR_AGREE_CEILING, REGION_SINGLE_CEILING,
};
use crate::straighten::weighting::Band;

const LEFT: usize = 0;
const RIGHT: usize = 1;
const CENTER: usize = 2;

pub fn estimate(field: &EdgeField, window: f64) -> AngleEstimate {
    let width = field.width as f64;
    let (center_lo, center_hi) = (REGION_CENTER_BAND.0 * width, REGION_CENTER_BAND.1 * width);

    let mut regions: [Vec<&EdgeSample>; 3] = Default::default();
    for s in field
        .samples
        .iter()
        .filter(|s| s.axis() == Axis::Vertical && s.deviation().abs() <= window)
    {
        let x = s.x as f64;
        if s.band == Band::Side {
            regions[if x < width / 2.0 { LEFT } else { RIGHT }].push(s);
        } else if x >= center_lo && x < center_hi {
            regions[CENTER].push(s);
        }
    }

    let readings = [read(&regions[LEFT]), read(&regions[RIGHT]), read(&regions[CENTER])];
    let sample_count: usize = regions.iter().map(Vec::len).sum();

    let Some((rule, members, ceiling)) = choose(&readings) else {
        return AngleEstimate::empty(EstimatorKind::RegionAnalysis);
    };

    let chosen: Vec<RegionReading> = members.iter().filter_map(|&i| readings[i]).collect();
    // Regions weigh in by how many samples agree with their median.
    let support = |r: &RegionReading| r.agreement * r.samples as f64;
    let weight: f64 = chosen.iter().map(support).sum();
    let angle = if weight > 0.0 {
        chosen.iter().map(|r| r.angle_degrees * support(r)).sum::<f64>() / weight
    } else {
        chosen.iter().map(|r| r.angle_degrees).sum::<f64>() / chosen.len() as f64
    };
    let mean_agreement = chosen.iter().map(|r| r.agreement).sum::<f64>() / chosen.len() as f64;
    let quality =
        ((mean_agreement - REGION_AGREEMENT_FLOOR) / REGION_AGREEMENT_SPAN).clamp(0.0, 1.0);

    AngleEstimate {
        method: EstimatorKind::RegionAnalysis,
        angle_degrees: angle,
        confidence: ceiling * quality,
        support: sample_count,
        diagnostics: Diagnostics::RegionAnalysis {
            rule: rule.to_string(),
            regions: readings,
        },
    }
}

/// Weighted median and agreement of one region.
fn read(samples: &[&EdgeSample]) -> Option<RegionReading> {
    if samples.len() < REGION_MIN_SAMPLES {
        return None;
    }
    let mut pairs: Vec<(f64, f64)> = samples.iter().map(|s| (s.deviation(), s.vote())).collect();
    let median = weighted_median(&mut pairs)?;
    let total: f64 = pairs.iter().map(|&(_, w)| w).sum();
    let near: f64 = pairs
        .iter()
        .filter(|&&(dev, _)| (dev - median).abs() <= AGREEMENT_TOLERANCE_DEG)
        .map(|&(_, w)| w)
        .sum();
    Some(RegionReading {
        angle_degrees: median,
        agreement: near / total,
        samples: samples.len(),
    })
}

/// Pick the combination rule: its name, the regions it averages and its ceiling.
fn choose(readings: &[Option<RegionReading>; 3]) -> Option<(&'static str, Vec<usize>, f64)> {
    let agree = |a: usize, b: usize| match (readings[a], readings[b]) {
        (Some(ra), Some(rb)) => (ra.angle_degrees - rb.angle_degrees).abs() <= AGREEMENT_TOLERANCE_DEG,
        _ => false,
    };
    let agreement = |i: usize| readings[i].map_or(0.0, |r| r.agreement);

    if agree(LEFT, RIGHT) && agree(LEFT, CENTER) && agree(RIGHT, CENTER) {
        return Some(("all_agree", vec![LEFT, RIGHT, CENTER], REGION_ALL_AGREE_CEILING));
    }
    if agree(LEFT, RIGHT) {
        return Some(("borders_agree", vec![LEFT, RIGHT], REGION_BORDERS_AGREE_CEILING));
    }
    let pair = [(LEFT, CENTER), (RIGHT, CENTER)]
        .into_iter()
        .filter(|&(a, b)| agree(a, b))
        .max_by(|p, q| (agreement(p.0) + agreement(p.1)).total_cmp(&(agreement(q.0) + agreement(q.1))));
    if let Some((a, b)) = pair {
        return Some(("pair_agree", vec![a, b], REGION_PAIR_AGREE_CEILING));
    }
    (0..3)
        .filter(|&i| readings[i].is_some())
        .max_by(|&a, &b| agreement(a).total_cmp(&agreement(b)))
        .map(|i| ("single", vec![i], REGION_SINGLE_CEILING))
}
