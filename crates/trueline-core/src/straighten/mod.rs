//! Straightening detection.
//!
//! Estimates the small rotation that levels a photograph. The pipeline:
//! 1. Down-sample to a grayscale working preview
//! 2. Extract weighted Sobel edge samples
//! 3. Drop samples that do not continue along their own tangent
//! 4. Run four independent estimators over the samples in parallel
//! 5. Combine their estimates by angular agreement
//! 6. Limit the combined angle by confidence tier
//!
//! # Angle Convention
//!
//! The returned angle is the correction to apply: content rotated
//! counter-clockwise by θ reports -θ, and rotating by the returned angle with
//! the rotate primitive (positive = counter-clockwise) levels it.

mod edges;
mod ensemble;
pub mod estimators;
mod limiter;
mod support;
pub mod tunables;
mod weighting;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::buffer::{working_preview, BufferError, PixelBuffer};

pub use edges::{extract_edges, Axis, EdgeField, EdgeSample};
pub use ensemble::{combine, EnsembleResult};
pub use estimators::{AngleEstimate, Diagnostics, EstimatorKind};
pub use limiter::{limit, LimitedDecision};
pub use support::{filter_supported, LineSupport};
pub use weighting::{Band, PositionWeights};

/// Errors from straightening detection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// The image is too small to carry usable edges.
    #[error("Image too small for detection: {width}x{height} (minimum {minimum}px per side)")]
    TooSmall { width: u32, height: u32, minimum: u32 },

    /// A setting is out of range.
    #[error("Invalid setting {field}: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// The input buffer is malformed.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum Sobel magnitude for an edge sample (8-bit scale).
    pub edge_threshold: f64,
    /// Long side of the working preview in pixels.
    pub working_max_edge: u32,
    /// Images smaller than this on either side are skipped.
    pub min_dimension: u32,
    /// Search window half-width in degrees.
    pub search_window: f64,
    /// Width of the border bands as a fraction of the image size.
    pub border_fraction: f64,
    /// Weight for samples in the left/right bands.
    pub side_weight: f64,
    /// Weight for samples in the top/bottom bands.
    pub top_bottom_weight: f64,
    /// Weight for interior samples.
    pub interior_weight: f64,
    /// Pixels an edge must continue along its tangent on each side to vote.
    /// Zero lets every sample vote.
    pub line_support_reach: u32,
    /// Orientation tolerance in degrees for line support.
    pub line_support_tolerance: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 35.0,
            working_max_edge: 800,
            min_dimension: 50,
            search_window: 6.0,
            border_fraction: 0.2,
            side_weight: 2.5,
            top_bottom_weight: 1.5,
            interior_weight: 1.0,
            line_support_reach: 10,
            line_support_tolerance: 8.0,
        }
    }
}

impl DetectionConfig {
    /// Largest accepted search window half-width in degrees.
    pub const MAX_SEARCH_WINDOW: f64 = 45.0;
    /// Largest accepted line support reach in pixels.
    pub const MAX_LINE_SUPPORT_REACH: u32 = 64;

    /// Check every setting is in range.
    pub fn validate(&self) -> Result<(), DetectError> {
        let invalid = |field, reason| Err(DetectError::InvalidConfig { field, reason });

        if !self.search_window.is_finite()
            || self.search_window <= 0.0
            || self.search_window > Self::MAX_SEARCH_WINDOW
        {
            return invalid("search_window", "must be in (0, 45] degrees");
        }
        if self.working_max_edge == 0 {
            return invalid("working_max_edge", "must be positive");
        }
        if self.min_dimension < 3 {
            return invalid("min_dimension", "must be at least 3");
        }
        if !self.edge_threshold.is_finite() || self.edge_threshold < 0.0 {
            return invalid("edge_threshold", "must be finite and non-negative");
        }
        if !(0.0..=0.5).contains(&self.border_fraction) {
            return invalid("border_fraction", "must be in [0, 0.5]");
        }
        for (field, weight) in [
            ("side_weight", self.side_weight),
            ("top_bottom_weight", self.top_bottom_weight),
            ("interior_weight", self.interior_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return invalid(field, "must be finite and non-negative");
            }
        }
        if self.line_support_reach > Self::MAX_LINE_SUPPORT_REACH {
            return invalid("line_support_reach", "must be at most 64 pixels");
        }
        if !(0.0..=90.0).contains(&self.line_support_tolerance) {
            return invalid("line_support_tolerance", "must be in [0, 90] degrees");
        }
        Ok(())
    }

    pub fn line_support(&self) -> LineSupport {
        LineSupport {
            reach: self.line_support_reach,
            tolerance: self.line_support_tolerance,
        }
    }
}

/// Correction decision returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StraightenDecision {
    /// Rotation to apply, positive = counter-clockwise.
    pub angle_degrees: f64,
    /// Reliability in [0, 1].
    pub confidence: f64,
}

/// Everything detection computed on the way to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StraightenReport {
    /// Working preview dimensions.
    pub working_size: (u32, u32),
    /// Number of edge samples above threshold.
    pub edge_count: usize,
    /// Edge samples left after line support filtering.
    pub supported_count: usize,
    /// One estimate per estimator, in `EstimatorKind` order.
    pub estimates: Vec<AngleEstimate>,
    /// Combiner output before limiting.
    pub ensemble: EnsembleResult,
    /// Whether the limiter clamped the angle.
    pub clamped: bool,
    /// Final decision.
    pub decision: StraightenDecision,
}

/// Detect the straightening angle with default settings.
pub fn detect_straighten(image: &PixelBuffer) -> Result<StraightenDecision, DetectError> {
    detect_straighten_with(image, &DetectionConfig::default())
}

/// Detect the straightening angle with explicit settings.
pub fn detect_straighten_with(
    image: &PixelBuffer,
    config: &DetectionConfig,
) -> Result<StraightenDecision, DetectError> {
    straighten_report(image, config).map(|report| report.decision)
}

/// Run detection and return the full diagnostic report.
///
/// # Arguments
///
/// * `image` - Decoded image in any supported format
/// * `config` - Detection settings
///
/// # Returns
///
/// The report, `DetectError::InvalidConfig` for out-of-range settings,
/// `DetectError::TooSmall` for images under `min_dimension`, or
/// `DetectError::Buffer` for malformed buffers.
pub fn straighten_report(
    image: &PixelBuffer,
    config: &DetectionConfig,
) -> Result<StraightenReport, DetectError> {
    config.validate()?;
    image.validate()?;
    if image.width < config.min_dimension || image.height < config.min_dimension {
        debug!(
            width = image.width,
            height = image.height,
            minimum = config.min_dimension,
            "image too small for straightening detection"
        );
        return Err(DetectError::TooSmall {
            width: image.width,
            height: image.height,
            minimum: config.min_dimension,
        });
    }

    let preview = working_preview(image, config.working_max_edge)?;
    let weights = PositionWeights::from_config(config);
    let edges = extract_edges(&preview, config.edge_threshold, &weights);
    let field = filter_supported(&edges, &config.line_support());
    let estimates = estimators::run_all(&field, config.search_window);
    let ensemble = combine(&estimates);
    let limited = limit(ensemble.angle_degrees, ensemble.confidence);

    debug!(
        edges = edges.samples.len(),
        supported = field.samples.len(),
        angle = limited.angle_degrees,
        confidence = limited.confidence,
        agreeing = ensemble.agreeing,
        "straightening detection finished"
    );

    Ok(StraightenReport {
        working_size: (field.width, field.height),
        edge_count: edges.samples.len(),
        supported_count: field.samples.len(),
        estimates: estimates.to_vec(),
        ensemble,
        clamped: limited.clamped,
        decision: StraightenDecision {
            angle_degrees: limited.angle_degrees,
            confidence: limited.confidence,
        },
    })
}
