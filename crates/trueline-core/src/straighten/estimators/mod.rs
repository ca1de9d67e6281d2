//! Independent angle estimators.
//!
//! Every estimator reads the same immutable [`EdgeField`] and none reads
//! another's output, so they run concurrently. Each always returns an
//! estimate; with no usable evidence that estimate is `(0°, 0)`.

mod histogram_vote;
mod long_line;
mod region;
mod rotation_search;

use serde::{Deserialize, Serialize};

use super::edges::EdgeField;

pub use histogram_vote::estimate as histogram_vote;
pub use long_line::estimate as long_line;
pub use region::estimate as region_analysis;
pub use rotation_search::estimate as rotation_search;

/// Estimator identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    RotationSearch,
    HistogramVote,
    RegionAnalysis,
    LongLine,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 4] = [
        EstimatorKind::RotationSearch,
        EstimatorKind::HistogramVote,
        EstimatorKind::RegionAnalysis,
        EstimatorKind::LongLine,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EstimatorKind::RotationSearch => "rotation_search",
            EstimatorKind::HistogramVote => "histogram_vote",
            EstimatorKind::RegionAnalysis => "region_analysis",
            EstimatorKind::LongLine => "long_line",
        }
    }
}

/// Per-region result of region analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionReading {
    pub angle_degrees: f64,
    /// Fraction of the region's samples within tolerance of its median.
    pub agreement: f64,
    pub samples: usize,
}

/// Method-specific evidence behind an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostics {
    RotationSearch {
        improvement: f64,
        peak_ratio: f64,
        peak_count: usize,
        tier: String,
    },
    HistogramVote {
        concentration: f64,
        total_mass: f64,
        border_support: f64,
        tier: String,
    },
    RegionAnalysis {
        rule: String,
        /// Left, right and center readings; `None` when a region had too few samples.
        regions: [Option<RegionReading>; 3],
    },
    LongLine {
        line_count: usize,
        std_dev: f64,
        longest_fraction: f64,
    },
    /// No usable evidence.
    None,
}

/// One estimator's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleEstimate {
    pub method: EstimatorKind,
    /// Correction angle in degrees, positive = counter-clockwise.
    pub angle_degrees: f64,
    pub confidence: f64,
    /// Number of edge samples (or lines) that supported the estimate.
    pub support: usize,
    pub diagnostics: Diagnostics,
}

impl AngleEstimate {
    /// The "no signal" estimate.
    pub fn empty(method: EstimatorKind) -> Self {
        Self {
            method,
            angle_degrees: 0.0,
            confidence: 0.0,
            support: 0,
            diagnostics: Diagnostics::None,
        }
    }
}

/// Run all four estimators concurrently, in [`EstimatorKind::ALL`] order.
pub fn run_all(field: &EdgeField, window: f64) -> [AngleEstimate; 4] {
    let ((search, vote), (region, line)) = rayon::join(
        || {
            rayon::join(
                || rotation_search(field, window),
                || histogram_vote(field, window),
            )
        },
        || {
            rayon::join(
                || region_analysis(field, window),
                || long_line(field, window),
            )
        },
    );
    [search, vote, region, line]
}

/// Weighted median of `(value, weight)` pairs. `None` when the total weight is zero.
pub(crate) fn weighted_median(pairs: &mut [(f64, f64)]) -> Option<f64> {
    let total: f64 = pairs.iter().map(|&(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = total / 2.0;
    let mut acc = 0.0;
    for &(value, weight) in pairs.iter() {
        acc += weight;
        if acc >= half {
            return Some(value);
        }
    }
    pairs.last().map(|&(v, _)| v)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_weighted_median() {
        let mut pairs = vec![(3.0, 1.0), (1.0, 1.0), (2.0, 1.0)];
        assert_eq!(weighted_median(&mut pairs), Some(2.0));
        let mut pairs = vec![(1.0, 1.0), (5.0, 10.0)];
        assert_eq!(weighted_median(&mut pairs), Some(5.0));
        assert_eq!(weighted_median(&mut []), None);
        assert_eq!(weighted_median(&mut [(1.0, 0.0)]), None);
    }

    #[test]
    fn test_empty_field_all_zero() {
        let estimates = run_all(&EdgeField::default(), 6.0);
        for (estimate, kind) in estimates.iter().zip(EstimatorKind::ALL) {
            assert_eq!(estimate.method, kind);
            assert_eq!(estimate.angle_degrees, 0.0);
            assert_eq!(estimate.confidence, 0.0);
        }
    }

    #[test]
    fn test_run_all_order_and_agreement() {
        let mut samples = Vec::new();
        for x in [20.0, 40.0, 200.0, 360.0, 380.0] {
            samples.extend(line(x, 10, 290, -2.0));
        }
        let estimates = run_all(&field(samples), 6.0);
        for (estimate, kind) in estimates.iter().zip(EstimatorKind::ALL) {
            assert_eq!(estimate.method, kind);
            assert!(
                (estimate.angle_degrees + 2.0).abs() < 0.3,
                "{}: {}",
                kind.name(),
                estimate.angle_degrees
            );
            assert!(estimate.confidence > 0.15, "{}", kind.name());
        }
    }

    #[test]
    fn test_diagnostics_serialize_tagged() {
        let json = serde_json::to_string(&Diagnostics::LongLine {
            line_count: 2,
            std_dev: 0.1,
            longest_fraction: 0.9,
        })
        .unwrap();
        assert!(json.contains(r#""kind":"long_line""#));
    }
}
