//! Calibration constants and confidence tables for straightening detection.
//!
//! Each estimator derives metrics from its own evidence and then looks its
//! confidence up in an ordered table of [`Tier`]s: the first tier whose
//! predicate holds wins. Penalty tables use the same row type but every
//! matching row applies, multiplying the confidence. Keeping the numbers here
//! lets them be reviewed and tuned as data.

/// One row of a confidence table: a named predicate and the value it yields.
pub struct Tier<M> {
    pub label: &'static str,
    pub when: fn(&M) -> bool,
    pub value: f64,
}

/// First matching tier, top to bottom.
pub fn first_match<'a, M>(table: &'a [Tier<M>], metrics: &M) -> Option<&'a Tier<M>> {
    table.iter().find(|tier| (tier.when)(metrics))
}

/// Product of the values of every matching row.
pub fn apply_penalties<M>(table: &[Tier<M>], metrics: &M) -> f64 {
    table
        .iter()
        .filter(|tier| (tier.when)(metrics))
        .fold(1.0, |acc, tier| acc * tier.value)
}

// ===== Line support =====

/// Spacing of the checks along a sample's tangent, in pixels.
pub const SUPPORT_STEP: u32 = 2;
/// Offsets across the tangent at which a supporter may sit.
pub const SUPPORT_NORMAL_OFFSETS: [f64; 3] = [-1.0, 0.0, 1.0];
/// Fields with fewer supported samples than this carry no usable structure.
pub const SUPPORT_MIN_SAMPLES: usize = 100;

// ===== Rotation search =====

/// Metrics derived from the rotation-search score curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchMetrics {
    pub angle: f64,
    /// Best score over the score at zero rotation.
    pub improvement: f64,
    /// Best score over the mean score across the window.
    pub peak_ratio: f64,
    /// Local maxima scoring at least [`SEARCH_PEAK_PROMINENCE`] of the best.
    pub peak_count: usize,
}

pub const SEARCH_COARSE_STEP_DEG: f64 = 0.1;
pub const SEARCH_FINE_STEP_DEG: f64 = 0.02;
pub const SEARCH_FINE_SPAN_DEG: f64 = 0.1;
/// Angular sigma of the alignment kernel.
pub const SEARCH_ALIGN_SIGMA_DEG: f64 = 0.5;
pub const SEARCH_PEAK_PROMINENCE: f64 = 0.5;
pub const SEARCH_CEILING: f64 = 0.55;

pub const SEARCH_TIERS: &[Tier<SearchMetrics>] = &[
    Tier {
        label: "decisive",
        when: |m| m.improvement >= 3.0 && m.peak_ratio >= 2.5 && m.peak_count == 1,
        value: 0.55,
    },
    Tier {
        label: "strong",
        when: |m| m.improvement >= 2.0 && m.peak_ratio >= 2.0 && m.peak_count <= 2,
        value: 0.45,
    },
    Tier {
        label: "clear",
        when: |m| m.improvement >= 1.5 && m.peak_ratio >= 1.6,
        value: 0.35,
    },
    Tier {
        label: "weak",
        when: |m| m.improvement >= 1.2 && m.peak_ratio >= 1.3,
        value: 0.25,
    },
    Tier {
        label: "faint",
        when: |m| m.peak_ratio >= 1.15,
        value: 0.12,
    },
    Tier {
        label: "none",
        when: |_| true,
        value: 0.05,
    },
];

pub const SEARCH_PENALTIES: &[Tier<SearchMetrics>] = &[
    Tier {
        label: "large angle",
        when: |m| m.angle.abs() > 4.0,
        value: 0.8,
    },
    Tier {
        label: "soft peak",
        when: |m| m.peak_ratio < 1.6,
        value: 0.85,
    },
    Tier {
        label: "small improvement",
        when: |m| m.improvement < 1.3,
        value: 0.85,
    },
    Tier {
        label: "competing peak",
        when: |m| m.peak_count >= 2,
        value: 0.8,
    },
    Tier {
        label: "many peaks",
        when: |m| m.peak_count >= 3,
        value: 0.6,
    },
];

// ===== Histogram voting =====

/// Metrics derived from the vote histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteMetrics {
    /// Share of total vote mass within [`VOTE_PEAK_HALF_WIDTH_DEG`] of the peak.
    pub concentration: f64,
    /// Total capped position weight inside the window.
    pub total_mass: f64,
    /// Share of the peak mass contributed by border-band samples.
    pub border_support: f64,
}

pub const VOTE_BIN_DEG: f64 = 0.1;
pub const VOTE_GRID_CELLS: usize = 8;
/// Cell caps as multiples of the mean cell mass.
pub const VOTE_INTERIOR_CELL_CAP: f64 = 2.0;
pub const VOTE_BORDER_CELL_CAP: f64 = 4.0;
pub const VOTE_PEAK_HALF_WIDTH_DEG: f64 = 0.75;
pub const VOTE_REFINE_HALF_WIDTH_DEG: f64 = 0.5;
pub const VOTE_SMOOTHING: [f64; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
pub const VOTE_BORDER_SUPPORT_MIN: f64 = 0.2;
pub const VOTE_CEILING_WITH_BORDER: f64 = 0.55;
pub const VOTE_CEILING_WITHOUT_BORDER: f64 = 0.20;

pub const VOTE_TIERS: &[Tier<VoteMetrics>] = &[
    Tier {
        label: "sharp",
        when: |m| m.concentration >= 0.5,
        value: 0.55,
    },
    Tier {
        label: "focused",
        when: |m| m.concentration >= 0.4,
        value: 0.45,
    },
    Tier {
        label: "clear",
        when: |m| m.concentration >= 0.3,
        value: 0.35,
    },
    Tier {
        label: "weak",
        when: |m| m.concentration >= 0.22,
        value: 0.25,
    },
    Tier {
        label: "faint",
        when: |m| m.concentration >= 0.17,
        value: 0.15,
    },
    Tier {
        label: "none",
        when: |_| true,
        value: 0.05,
    },
];

pub const VOTE_PENALTIES: &[Tier<VoteMetrics>] = &[Tier {
    label: "sparse",
    when: |m| m.total_mass < 40.0,
    value: 0.6,
}];

// ===== Region analysis =====

/// Central band used as the third region, as fractions of the width.
pub const REGION_CENTER_BAND: (f64, f64) = (0.3, 0.7);
pub const REGION_MIN_SAMPLES: usize = 15;
/// Agreement below this floor yields no confidence.
pub const REGION_AGREEMENT_FLOOR: f64 = 0.3;
/// Agreement span above the floor that reaches the full ceiling.
pub const REGION_AGREEMENT_SPAN: f64 = 0.45;
pub const REGION_ALL_AGREE_CEILING: f64 = 0.55;
pub const REGION_BORDERS_AGREE_CEILING: f64 = 0.50;
pub const REGION_PAIR_AGREE_CEILING: f64 = 0.40;
pub const REGION_SINGLE_CEILING: f64 = 0.25;

// ===== Long-line tracing =====

/// Extra angular slack when indexing candidate ridge pixels.
pub const LINE_INDEX_SLACK_DEG: f64 = 3.0;
/// Largest deviation of a traced pixel from the run's mean angle.
pub const LINE_ANGLE_TOLERANCE_DEG: f64 = 3.0;
/// Rows a run may skip without a matching pixel.
pub const LINE_MAX_GAP_ROWS: u32 = 2;
/// Half-width of the ridge consumed around each traced pixel.
pub const LINE_RIDGE_HALF_WIDTH: i64 = 2;
/// Minimum run length as a fraction of the image height.
pub const LINE_MIN_LENGTH_FRACTION: f64 = 0.3;
pub const LINE_MAX_LINES: usize = 10;
pub const LINE_COUNT_SATURATION: f64 = 4.0;
pub const LINE_CONSISTENCY_SCALE_DEG: f64 = 0.5;
/// Length fraction that earns full length credit.
pub const LINE_FULL_LENGTH_FRACTION: f64 = 0.8;
pub const LINE_WEIGHTS: (f64, f64, f64) = (0.4, 0.35, 0.25);
pub const LINE_CEILING: f64 = 0.5;

// ===== Combiner =====

/// Estimates below this confidence are ignored.
pub const COMBINE_FLOOR: f64 = 0.15;
/// Estimates within this many degrees of the best one count as agreeing.
pub const AGREEMENT_TOLERANCE_DEG: f64 = 1.5;
/// Bonus by number of agreeing estimates (index = count).
pub const AGREEMENT_BONUS: [f64; 5] = [0.0, 0.0, 0.03, 0.10, 0.18];
pub const COMBINE_CEILING: f64 = 0.75;

// ===== Limiter =====

/// Maximum correction magnitude by confidence.
pub const LIMIT_TIERS: &[Tier<f64>] = &[
    Tier {
        label: "high",
        when: |c| *c >= 0.70,
        value: 6.0,
    },
    Tier {
        label: "good",
        when: |c| *c >= 0.55,
        value: 4.0,
    },
    Tier {
        label: "moderate",
        when: |c| *c >= 0.40,
        value: 2.5,
    },
    Tier {
        label: "low",
        when: |c| *c >= 0.25,
        value: 1.5,
    },
    Tier {
        label: "minimal",
        when: |_| true,
        value: 0.8,
    },
];

pub const LIMIT_CLAMP_PENALTY: f64 = 0.8;
pub const LIMIT_LARGE_ANGLE_DEG: f64 = 3.0;
pub const LIMIT_LARGE_ANGLE_PENALTY: f64 = 0.85;
