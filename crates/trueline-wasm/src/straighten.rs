//! WASM bindings for straightening detection.

use crate::types::JsPixelBuffer;
use trueline_core::{DetectError, StraightenDecision};
use wasm_bindgen::prelude::*;

/// Detected correction for JavaScript.
#[wasm_bindgen]
#[derive(Debug, Clone, Copy)]
pub struct JsStraightenResult {
    angle_degrees: f64,
    confidence: f64,
}

#[wasm_bindgen]
impl JsStraightenResult {
    /// Rotation to apply in degrees, positive = counter-clockwise.
    #[wasm_bindgen(getter)]
    pub fn angle_degrees(&self) -> f64 {
        self.angle_degrees
    }

    /// Reliability in [0, 1].
    #[wasm_bindgen(getter)]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl From<StraightenDecision> for JsStraightenResult {
    fn from(decision: StraightenDecision) -> Self {
        Self {
            angle_degrees: decision.angle_degrees,
            confidence: decision.confidence,
        }
    }
}

/// Detect the straightening angle of an image.
///
/// # Example (TypeScript)
///
/// ```typescript
/// const result = detect_straighten(image);
/// if (result.confidence >= 0.3 && Math.abs(result.angle_degrees) >= 0.3) {
///   const levelled = apply_transform(image, { rotate: { angle_degrees: result.angle_degrees } });
/// }
/// ```
///
/// Throws for images below 50px on either side or malformed buffers.
#[wasm_bindgen]
pub fn detect_straighten(image: &JsPixelBuffer) -> Result<JsStraightenResult, JsValue> {
    detect(image).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn detect(image: &JsPixelBuffer) -> Result<JsStraightenResult, DetectError> {
    trueline_core::detect_straighten(image.buffer()).map(JsStraightenResult::from)
}
