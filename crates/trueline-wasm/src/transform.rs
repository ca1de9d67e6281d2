//! WASM bindings for pixel transforms.
//!
//! Parameters arrive as a plain object whose single key selects the
//! primitive, e.g. `{ rotate: { angle_degrees: 2.5 } }` or
//! `{ tone: { exposure: 0.5 } }`.

use crate::types::JsPixelBuffer;
use trueline_core::{TransformError, TransformParams};
use wasm_bindgen::prelude::*;

/// Apply one transform to an image.
///
/// # Arguments
///
/// * `image` - Source image, left untouched
/// * `params` - Object with one of `undistort`, `smooth`, `local_contrast`,
///   `rotate`, `tone` or `watermark`
///
/// # Returns
///
/// A new `JsPixelBuffer`. Throws with a descriptive reason when the
/// parameters are invalid; nothing is applied in that case.
///
/// # Example (TypeScript)
///
/// ```typescript
/// const levelled = apply_transform(image, { rotate: { angle_degrees: -1.8, auto_crop: true } });
/// const smoothed = apply_transform(levelled, { smooth: { radius: 3 } });
/// ```
#[wasm_bindgen]
pub fn apply_transform(image: &JsPixelBuffer, params: JsValue) -> Result<JsPixelBuffer, JsValue> {
    let params: TransformParams = serde_wasm_bindgen::from_value(params)
        .map_err(|e| JsValue::from_str(&format!("Invalid transform parameters: {}", e)))?;
    apply(image, &params).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn apply(
    image: &JsPixelBuffer,
    params: &TransformParams,
) -> Result<JsPixelBuffer, TransformError> {
    trueline_core::apply_transform(image.buffer(), params).map(JsPixelBuffer::from_buffer)
}
