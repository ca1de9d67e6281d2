//! Rotation with optional auto-crop and normalized crop.
//!
//! # Algorithm
//!
//! The output is built by inverse mapping: each output pixel center is placed
//! in a frame centered on the source, rotated back by the requested angle and
//! bilinearly sampled from the source.
//!
//! For output offset `d` from the frame center and angle θ:
//! ```text
//! src_x = d_x * cos(θ) - d_y * sin(θ) + src_cx
//! src_y = d_x * sin(θ) + d_y * cos(θ) + src_cy
//! ```
//!
//! With auto-crop the frame is the largest axis-aligned rectangle that fits
//! inside the rotated source, so no sample ever falls outside the image.
//! Without it the frame keeps the source dimensions and uncovered pixels are
//! zero (fully transparent for RGBA).
//!
//! The optional crop rectangle is applied last, relative to the frame.

use serde::{Deserialize, Serialize};

use super::sample::{bilinear, to_byte};
use super::{check_range, TransformError};
use crate::buffer::PixelBuffer;
use crate::compute::{Device, DeviceError};

/// Largest accepted rotation magnitude in degrees.
pub const MAX_ROTATION_DEGREES: f64 = 45.0;

/// Normalized crop rectangle.
///
/// - (0.0, 0.0) = top-left corner
/// - width/height are relative to the rotated frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    /// The whole frame.
    pub const FULL: CropRect = CropRect {
        left: 0.0,
        top: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Reject rectangles that leave the unit square or have no area.
    pub fn validate(&self) -> Result<(), TransformError> {
        let values = [self.left, self.top, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::InvalidParams(
                "crop values must be finite".to_string(),
            ));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(TransformError::InvalidParams(format!(
                "crop size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        const EPS: f64 = 1e-9;
        if self.left < 0.0
            || self.top < 0.0
            || self.left + self.width > 1.0 + EPS
            || self.top + self.height > 1.0 + EPS
        {
            return Err(TransformError::InvalidParams(format!(
                "crop rectangle ({}, {}, {}, {}) extends outside the image",
                self.left, self.top, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Pixel rectangle `(left, top, width, height)` inside a `w` x `h` frame.
    ///
    /// Output is at least 1x1 and never extends past the frame.
    fn to_pixels(self, w: u32, h: u32) -> (u32, u32, u32, u32) {
        let px_left = ((self.left * w as f64).round() as u32).min(w.saturating_sub(1));
        let px_top = ((self.top * h as f64).round() as u32).min(h.saturating_sub(1));
        let px_width = (self.width * w as f64).round() as u32;
        let px_height = (self.height * h as f64).round() as u32;
        let out_width = px_width.min(w - px_left).max(1);
        let out_height = px_height.min(h - px_top).max(1);
        (px_left, px_top, out_width, out_height)
    }
}

/// Rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateParams {
    /// Rotation in degrees, positive = counter-clockwise.
    pub angle_degrees: f64,
    /// Crop to the largest inscribed rectangle.
    pub auto_crop: bool,
    /// Optional crop relative to the (auto-cropped) frame.
    pub crop: Option<CropRect>,
}

impl Default for RotateParams {
    fn default() -> Self {
        Self {
            angle_degrees: 0.0,
            auto_crop: true,
            crop: None,
        }
    }
}

impl RotateParams {
    /// Auto-cropped rotation by `angle_degrees`.
    pub fn new(angle_degrees: f64) -> Self {
        Self {
            angle_degrees,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TransformError> {
        check_range(
            "angle_degrees",
            self.angle_degrees,
            -MAX_ROTATION_DEGREES,
            MAX_ROTATION_DEGREES,
        )?;
        if let Some(crop) = &self.crop {
            crop.validate()?;
        }
        Ok(())
    }

    fn is_noop(&self) -> bool {
        self.angle_degrees.abs() < 0.001 && self.crop.is_none()
    }
}

/// Largest axis-aligned rectangle inside a `width` x `height` image rotated
/// by `angle_degrees`.
///
/// # Returns
///
/// Tuple of (width, height) in whole pixels, each at least 1 and at most the
/// source dimension.
pub fn inscribed_crop_size(width: u32, height: u32, angle_degrees: f64) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let angle = angle_degrees.to_radians();
    let sin_a = angle.sin().abs();
    let cos_a = angle.cos().abs();
    if sin_a < 1e-12 {
        return (width, height);
    }

    let width_is_longer = w >= h;
    let (long, short) = if width_is_longer { (w, h) } else { (h, w) };

    let (crop_w, crop_h) = if short <= 2.0 * sin_a * cos_a * long || (sin_a - cos_a).abs() < 1e-10 {
        // Half-constrained: two corners touch the longer side.
        let x = 0.5 * short;
        if width_is_longer {
            (x / sin_a, x / cos_a)
        } else {
            (x / cos_a, x / sin_a)
        }
    } else {
        // Fully constrained: all four corners touch the rotated edges.
        let cos_2a = cos_a * cos_a - sin_a * sin_a;
        (
            (w * cos_a - h * sin_a) / cos_2a,
            (h * cos_a - w * sin_a) / cos_2a,
        )
    };

    (
        (crop_w.floor() as u32).clamp(1, width),
        (crop_h.floor() as u32).clamp(1, height),
    )
}

/// Output layout shared by both paths.
#[derive(Debug, Clone, Copy)]
struct Layout {
    frame_w: u32,
    frame_h: u32,
    crop_x: u32,
    crop_y: u32,
    out_w: u32,
    out_h: u32,
}

impl Layout {
    fn new(image: &PixelBuffer, params: &RotateParams) -> Self {
        let (frame_w, frame_h) = if params.auto_crop {
            inscribed_crop_size(image.width, image.height, params.angle_degrees)
        } else {
            (image.width, image.height)
        };
        let (crop_x, crop_y, out_w, out_h) = params
            .crop
            .unwrap_or(CropRect::FULL)
            .to_pixels(frame_w, frame_h);
        Self {
            frame_w,
            frame_h,
            crop_x,
            crop_y,
            out_w,
            out_h,
        }
    }
}

/// Output-to-source mapping shared by both paths, so they agree on which
/// output pixels fall outside the rotated footprint.
struct SourceMap {
    layout: Layout,
    cos: f64,
    sin: f64,
    src_w: f64,
    src_h: f64,
}

impl SourceMap {
    fn new(image: &PixelBuffer, params: &RotateParams) -> Self {
        let angle = params.angle_degrees.to_radians();
        Self {
            layout: Layout::new(image, params),
            cos: angle.cos(),
            sin: angle.sin(),
            src_w: image.width as f64,
            src_h: image.height as f64,
        }
    }

    /// Source coordinates sampled for output pixel `(ox, oy)`.
    fn source_point(&self, ox: u32, oy: u32) -> (f64, f64) {
        let l = &self.layout;
        let dx = (ox + l.crop_x) as f64 + 0.5 - l.frame_w as f64 / 2.0;
        let dy = (oy + l.crop_y) as f64 + 0.5 - l.frame_h as f64 / 2.0;
        (
            dx * self.cos - dy * self.sin + self.src_w / 2.0 - 0.5,
            dx * self.sin + dy * self.cos + self.src_h / 2.0 - 0.5,
        )
    }

    fn covers(&self, sx: f64, sy: f64) -> bool {
        sx >= -0.5 && sx <= self.src_w - 0.5 && sy >= -0.5 && sy <= self.src_h - 0.5
    }

    /// Source point for `(ox, oy)`, or `None` when it lies outside the source
    /// and the frame is not cropped to the footprint.
    fn covered_point(&self, ox: u32, oy: u32, auto_crop: bool) -> Option<(f64, f64)> {
        let (sx, sy) = self.source_point(ox, oy);
        (auto_crop || self.covers(sx, sy)).then_some((sx, sy))
    }
}

pub(crate) fn scalar(image: &PixelBuffer, params: &RotateParams) -> PixelBuffer {
    if params.is_noop() {
        return image.clone();
    }
    let map = SourceMap::new(image, params);
    let (out_w, out_h) = (map.layout.out_w, map.layout.out_h);
    let channels = image.channels();
    let mut pixels = vec![0u8; PixelBuffer::expected_len(out_w, out_h, image.format)];
    let mut sample = [0.0f64; 4];

    for oy in 0..out_h {
        for ox in 0..out_w {
            let Some((sx, sy)) = map.covered_point(ox, oy, params.auto_crop) else {
                continue;
            };
            bilinear(image, sx, sy, &mut sample);
            let idx = (oy as usize * out_w as usize + ox as usize) * channels;
            for c in 0..channels {
                pixels[idx + c] = to_byte(sample[c]);
            }
        }
    }

    PixelBuffer {
        width: out_w,
        height: out_h,
        format: image.format,
        pixels,
    }
}

pub(crate) fn kernel(
    device: &Device,
    image: &PixelBuffer,
    params: &RotateParams,
) -> Result<PixelBuffer, DeviceError> {
    if params.is_noop() {
        return Ok(image.clone());
    }
    let map = SourceMap::new(image, params);
    let dispatch = device.dispatch();
    let src = dispatch.upload(image)?;
    let auto_crop = params.auto_crop;

    let out = dispatch.launch(map.layout.out_w, map.layout.out_h, |ox, oy| {
        match map.covered_point(ox, oy, auto_crop) {
            Some((sx, sy)) => src.sample(sx as f32, sy as f32),
            None => [0.0; 4],
        }
    })?;
    Ok(out.unpack(image.format))
}
