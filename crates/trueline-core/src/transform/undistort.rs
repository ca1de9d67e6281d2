//! Lens distortion correction.
//!
//! Uses the polynomial model with three radial and two tangential
//! coefficients. Coordinates are normalized by the half-diagonal of the image
//! so coefficients mean the same thing at any resolution.
//!
//! For each output pixel the undistorted position `(x, y)` is pushed through
//! the distortion model to find where that point landed in the captured
//! image, which is then bilinearly sampled:
//! ```text
//! r2 = x^2 + y^2
//! kr = 1 + k1*r2 + k2*r2^2 + k3*r2^3
//! xd = x*kr + 2*p1*x*y + p2*(r2 + 2*x^2)
//! yd = y*kr + p1*(r2 + 2*y^2) + 2*p2*x*y
//! ```

use serde::{Deserialize, Serialize};

use super::sample::{bilinear, to_byte};
use super::{check_range, TransformError};
use crate::buffer::PixelBuffer;
use crate::compute::{Device, DeviceError};

/// Samples taken along the radius when checking the model for fold-over.
const FOLD_CHECK_STEPS: usize = 64;

/// Distortion model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndistortParams {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
    /// Optical center in normalized image coordinates; image center if unset.
    pub center: Option<[f64; 2]>,
    /// Output zoom; values above 1 hide the stretched border.
    pub scale: f64,
}

impl Default for UndistortParams {
    fn default() -> Self {
        Self {
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            center: None,
            scale: 1.0,
        }
    }
}

impl UndistortParams {
    fn is_identity(&self) -> bool {
        self.k1 == 0.0
            && self.k2 == 0.0
            && self.k3 == 0.0
            && self.p1 == 0.0
            && self.p2 == 0.0
            && self.scale == 1.0
    }

    fn center_px(&self, width: u32, height: u32) -> (f64, f64) {
        let [cx, cy] = self.center.unwrap_or([0.5, 0.5]);
        (cx * width as f64, cy * height as f64)
    }

    pub(crate) fn validate(&self, image: &PixelBuffer) -> Result<(), TransformError> {
        check_range("k1", self.k1, -1.0, 1.0)?;
        check_range("k2", self.k2, -1.0, 1.0)?;
        check_range("k3", self.k3, -1.0, 1.0)?;
        check_range("p1", self.p1, -0.1, 0.1)?;
        check_range("p2", self.p2, -0.1, 0.1)?;
        check_range("scale", self.scale, 0.25, 4.0)?;
        if let Some([cx, cy]) = self.center {
            check_range("center.x", cx, 0.0, 1.0)?;
            check_range("center.y", cy, 0.0, 1.0)?;
        }

        // The radial profile r * kr(r) must keep increasing out to the
        // farthest corner, otherwise the mapping folds back on itself.
        let (cx, cy) = self.center_px(image.width, image.height);
        let radius = half_diagonal(image.width, image.height);
        let (w, h) = (image.width as f64, image.height as f64);
        let far_x = cx.max(w - cx);
        let far_y = cy.max(h - cy);
        let r2_max = (far_x * far_x + far_y * far_y) / (radius * radius) / (self.scale * self.scale);
        for i in 0..=FOLD_CHECK_STEPS {
            let r2 = r2_max * i as f64 / FOLD_CHECK_STEPS as f64;
            let slope = 1.0 + 3.0 * self.k1 * r2 + 5.0 * self.k2 * r2 * r2 + 7.0 * self.k3 * r2 * r2 * r2;
            if slope <= 0.0 {
                return Err(TransformError::InvalidParams(format!(
                    "distortion model folds over at r^2 = {r2:.3}"
                )));
            }
        }
        Ok(())
    }
}

fn half_diagonal(width: u32, height: u32) -> f64 {
    0.5 * ((width as f64).powi(2) + (height as f64).powi(2)).sqrt()
}

pub(crate) fn scalar(image: &PixelBuffer, params: &UndistortParams) -> PixelBuffer {
    if params.is_identity() {
        return image.clone();
    }
    let (cx, cy) = params.center_px(image.width, image.height);
    let norm = half_diagonal(image.width, image.height);
    let inv = 1.0 / (norm * params.scale);
    let channels = image.channels();
    let mut output = image.clone();
    let mut sample = [0.0f64; 4];

    for oy in 0..image.height {
        for ox in 0..image.width {
            let x = (ox as f64 + 0.5 - cx) * inv;
            let y = (oy as f64 + 0.5 - cy) * inv;
            let r2 = x * x + y * y;
            let kr = 1.0 + r2 * (params.k1 + r2 * (params.k2 + r2 * params.k3));
            let xd = x * kr + 2.0 * params.p1 * x * y + params.p2 * (r2 + 2.0 * x * x);
            let yd = y * kr + params.p1 * (r2 + 2.0 * y * y) + 2.0 * params.p2 * x * y;

            bilinear(image, xd * norm + cx - 0.5, yd * norm + cy - 0.5, &mut sample);
            let idx = (oy as usize * image.width as usize + ox as usize) * channels;
            for c in 0..channels {
                output.pixels[idx + c] = to_byte(sample[c]);
            }
        }
    }
    output
}

pub(crate) fn kernel(
    device: &Device,
    image: &PixelBuffer,
    params: &UndistortParams,
) -> Result<PixelBuffer, DeviceError> {
    if params.is_identity() {
        return Ok(image.clone());
    }
    let dispatch = device.dispatch();
    let src = dispatch.upload(image)?;
    let (cx, cy) = params.center_px(image.width, image.height);
    let (cx, cy) = (cx as f32, cy as f32);
    let norm = half_diagonal(image.width, image.height) as f32;
    let inv = 1.0 / (norm * params.scale as f32);
    let (k1, k2, k3) = (params.k1 as f32, params.k2 as f32, params.k3 as f32);
    let (p1, p2) = (params.p1 as f32, params.p2 as f32);

    let out = dispatch.launch(image.width, image.height, |ox, oy| {
        let x = (ox as f32 + 0.5 - cx) * inv;
        let y = (oy as f32 + 0.5 - cy) * inv;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let kr = 1.0 + k1 * r2 + k2 * r4 + k3 * r4 * r2;
        let xd = x * kr + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        src.sample(xd * norm + cx - 0.5, yd * norm + cy - 0.5)
    })?;
    Ok(out.unpack(image.format))
}
