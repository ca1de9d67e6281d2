//! Safety limiter.
//!
//! Large corrections on photos that were already close to level are far
//! more often mistakes than real tilts, so the allowed magnitude shrinks
//! with confidence. Confidence only ever goes down here.

use tracing::debug;

use super::tunables::{
    first_match, LIMIT_CLAMP_PENALTY, LIMIT_LARGE_ANGLE_DEG, LIMIT_LARGE_ANGLE_PENALTY,
    LIMIT_TIERS,
};

/// Limiter output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitedDecision {
    pub angle_degrees: f64,
    pub confidence: f64,
    /// Whether the angle exceeded its cap.
    pub clamped: bool,
}

/// Largest correction allowed at a confidence.
pub fn cap_for(confidence: f64) -> f64 {
    first_match(LIMIT_TIERS, &confidence).map_or(0.0, |t| t.value)
}

/// Clamp an angle to the cap for its confidence tier.
pub fn limit(angle_degrees: f64, confidence: f64) -> LimitedDecision {
    let cap = cap_for(confidence);
    let mut angle = angle_degrees;
    let mut confidence = confidence;
    let clamped = angle.abs() > cap;
    if clamped {
        debug!(requested = angle, cap, "correction clamped by confidence tier");
        angle = cap.copysign(angle);
        confidence *= LIMIT_CLAMP_PENALTY;
    }
    if angle.abs() > LIMIT_LARGE_ANGLE_DEG {
        confidence *= LIMIT_LARGE_ANGLE_PENALTY;
    }
    LimitedDecision {
        angle_degrees: angle,
        confidence,
        clamped,
    }
}
