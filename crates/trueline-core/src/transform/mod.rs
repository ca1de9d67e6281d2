//! Pixel transforms with accelerated and scalar implementations.
//!
//! Six primitives, each selected by a [`TransformParams`] variant:
//! 1. `undistort` - radial lens distortion correction
//! 2. `smooth` - edge-preserving bilateral smoothing
//! 3. `local_contrast` - tiled contrast-limited histogram equalization
//! 4. `rotate` - rotation with optional auto-crop and normalized crop
//! 5. `tone` - exposure, brightness, contrast, highlights, shadows
//! 6. `watermark` - alpha-blended overlay, anchored or tiled
//!
//! Every primitive has a scalar routine (`f64` arithmetic on the 8-bit
//! buffer) and a device kernel (`f32` arithmetic on packed texels). Both
//! implement the same contract and agree to within one level per channel.
//!
//! # Coordinate System
//!
//! - Pixel centers sit at integer coordinates, origin top-left
//! - Rotation angles are in degrees, positive = counter-clockwise
//! - Crop rectangles and anchors are normalized (0.0 to 1.0)

mod bilateral;
mod clahe;
mod rotate;
mod sample;
mod tone;
mod undistort;
mod watermark;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::{BufferError, PixelBuffer};
use crate::compute::{Device, DeviceError, Executor};

pub use bilateral::BilateralParams;
pub use clahe::ClaheParams;
pub use rotate::{inscribed_crop_size, CropRect, RotateParams, MAX_ROTATION_DEGREES};
pub use tone::ToneParams;
pub use undistort::UndistortParams;
pub use watermark::{Anchor, WatermarkParams};

/// Errors returned to transform callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// Parameters are outside their documented domain.
    #[error("Invalid transform parameters: {0}")]
    InvalidParams(String),

    /// The input buffer is malformed.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// One transform request.
///
/// Serialized externally tagged, e.g. `{"rotate": {"angle_degrees": 2.5}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformParams {
    Undistort(UndistortParams),
    Smooth(BilateralParams),
    LocalContrast(ClaheParams),
    Rotate(RotateParams),
    Tone(ToneParams),
    Watermark(WatermarkParams),
}

impl TransformParams {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformParams::Undistort(_) => "undistort",
            TransformParams::Smooth(_) => "smooth",
            TransformParams::LocalContrast(_) => "local_contrast",
            TransformParams::Rotate(_) => "rotate",
            TransformParams::Tone(_) => "tone",
            TransformParams::Watermark(_) => "watermark",
        }
    }

    /// Check parameters against their domain and the target image.
    pub fn validate(&self, image: &PixelBuffer) -> Result<(), TransformError> {
        match self {
            TransformParams::Undistort(p) => p.validate(image),
            TransformParams::Smooth(p) => p.validate(),
            TransformParams::LocalContrast(p) => p.validate(image),
            TransformParams::Rotate(p) => p.validate(),
            TransformParams::Tone(p) => p.validate(),
            TransformParams::Watermark(p) => p.validate(),
        }
    }

    pub(crate) fn run_scalar(&self, image: &PixelBuffer) -> PixelBuffer {
        match self {
            TransformParams::Undistort(p) => undistort::scalar(image, p),
            TransformParams::Smooth(p) => bilateral::scalar(image, p),
            TransformParams::LocalContrast(p) => clahe::scalar(image, p),
            TransformParams::Rotate(p) => rotate::scalar(image, p),
            TransformParams::Tone(p) => tone::scalar(image, p),
            TransformParams::Watermark(p) => watermark::scalar(image, p),
        }
    }

    pub(crate) fn run_kernel(
        &self,
        device: &Device,
        image: &PixelBuffer,
    ) -> Result<PixelBuffer, DeviceError> {
        match self {
            TransformParams::Undistort(p) => undistort::kernel(device, image, p),
            TransformParams::Smooth(p) => bilateral::kernel(device, image, p),
            TransformParams::LocalContrast(p) => clahe::kernel(device, image, p),
            TransformParams::Rotate(p) => rotate::kernel(device, image, p),
            TransformParams::Tone(p) => tone::kernel(device, image, p),
            TransformParams::Watermark(p) => watermark::kernel(device, image, p),
        }
    }
}

/// Apply one transform through the process-wide executor.
///
/// # Arguments
///
/// * `image` - Source buffer, left untouched
/// * `params` - Primitive selection and settings
///
/// # Returns
///
/// A new buffer. Output dimensions equal the input's except for `rotate`
/// with auto-crop or an explicit crop.
pub fn apply_transform(
    image: &PixelBuffer,
    params: &TransformParams,
) -> Result<PixelBuffer, TransformError> {
    Executor::global().apply(image, params)
}

/// Reject non-finite values and values outside `[min, max]`.
pub(crate) fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), TransformError> {
    if !value.is_finite() || value < min || value > max {
        return Err(TransformError::InvalidParams(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_serde_tagging() {
        let params = TransformParams::Rotate(RotateParams {
            angle_degrees: 2.5,
            ..RotateParams::default()
        });
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.starts_with("{\"rotate\":"), "json was {json}");
        let back: TransformParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: TransformParams =
            serde_json::from_str(r#"{"smooth": {"radius": 2}}"#).unwrap();
        match params {
            TransformParams::Smooth(p) => {
                assert_eq!(p.radius, 2);
                assert_eq!(p.sigma_spatial, BilateralParams::default().sigma_spatial);
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(TransformParams::Tone(ToneParams::default()).kind(), "tone");
        assert_eq!(
            TransformParams::LocalContrast(ClaheParams::default()).kind(),
            "local_contrast"
        );
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("x", 0.5, 0.0, 1.0).is_ok());
        assert!(check_range("x", f64::NAN, 0.0, 1.0).is_err());
        let err = check_range("radius", 2.0, 0.0, 1.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transform parameters: radius must be within [0, 1], got 2"
        );
    }
}
