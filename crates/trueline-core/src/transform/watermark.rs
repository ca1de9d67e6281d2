//! Watermark compositing.
//!
//! The watermark is resized relative to the base width, positioned at one of
//! nine anchors (or tiled over the whole image starting from the anchor) and
//! blended with `alpha = watermark_alpha * opacity`. Base alpha is kept.
//! Gray bases receive the watermark's luminance.

use serde::{Deserialize, Serialize};

use super::sample::{bilinear, to_byte};
use super::{check_range, TransformError};
use crate::buffer::{PixelBuffer, PixelFormat};
use crate::compute::{Device, DeviceError, PackedImage};
use crate::luminance::{luminance_f32, luminance_f64};

/// Where the watermark sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    Bottom,
    #[default]
    BottomRight,
}

impl Anchor {
    /// Horizontal and vertical alignment: -1 start, 0 center, 1 end.
    fn alignment(self) -> (i8, i8) {
        match self {
            Anchor::TopLeft => (-1, -1),
            Anchor::Top => (0, -1),
            Anchor::TopRight => (1, -1),
            Anchor::Left => (-1, 0),
            Anchor::Center => (0, 0),
            Anchor::Right => (1, 0),
            Anchor::BottomLeft => (-1, 1),
            Anchor::Bottom => (0, 1),
            Anchor::BottomRight => (1, 1),
        }
    }
}

/// Watermark settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkParams {
    /// The overlay image; alpha is used when present.
    pub image: PixelBuffer,
    /// Global opacity (0 to 1). Zero leaves the base untouched.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Watermark width as a fraction of the base width (0 to 1].
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub anchor: Anchor,
    /// Inset from the anchored edges as a fraction of the shorter base side.
    #[serde(default = "default_margin")]
    pub margin: f64,
    /// Repeat the watermark across the whole image.
    #[serde(default)]
    pub tile: bool,
    /// Gap between tiles as a fraction of the watermark size.
    #[serde(default = "default_spacing")]
    pub spacing: f64,
}

fn default_opacity() -> f64 {
    0.5
}

fn default_scale() -> f64 {
    0.25
}

fn default_margin() -> f64 {
    0.02
}

fn default_spacing() -> f64 {
    0.5
}

impl WatermarkParams {
    /// Watermark with default placement.
    pub fn new(image: PixelBuffer) -> Self {
        Self {
            image,
            opacity: default_opacity(),
            scale: default_scale(),
            anchor: Anchor::default(),
            margin: default_margin(),
            tile: false,
            spacing: default_spacing(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TransformError> {
        self.image.validate()?;
        check_range("opacity", self.opacity, 0.0, 1.0)?;
        check_range("scale", self.scale, 1e-3, 1.0)?;
        check_range("margin", self.margin, 0.0, 0.49)?;
        check_range("spacing", self.spacing, 0.0, 10.0)
    }
}

/// Placement of the scaled watermark on the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    x0: i64,
    y0: i64,
    mark_w: i64,
    mark_h: i64,
    stride_x: i64,
    stride_y: i64,
    tile: bool,
}

impl Placement {
    fn new(base: &PixelBuffer, params: &WatermarkParams) -> Self {
        let (bw, bh) = (base.width as f64, base.height as f64);
        let mark_w = (bw * params.scale).round().max(1.0);
        let aspect = params.image.height as f64 / params.image.width as f64;
        let mark_h = (mark_w * aspect).round().max(1.0);
        let margin = (params.margin * bw.min(bh)).round();

        let (ax, ay) = params.anchor.alignment();
        let place = |align: i8, extent: f64, size: f64| -> i64 {
            match align {
                -1 => margin as i64,
                0 => ((extent - size) / 2.0).floor() as i64,
                _ => (extent - size - margin) as i64,
            }
        };

        let (mark_w, mark_h) = (mark_w as i64, mark_h as i64);
        Self {
            x0: place(ax, bw, mark_w as f64),
            y0: place(ay, bh, mark_h as f64),
            mark_w,
            mark_h,
            stride_x: mark_w + (mark_w as f64 * params.spacing).round() as i64,
            stride_y: mark_h + (mark_h as f64 * params.spacing).round() as i64,
            tile: params.tile,
        }
    }

    /// Position inside the watermark for base pixel `(x, y)`, if covered.
    #[inline]
    fn local(&self, x: i64, y: i64) -> Option<(i64, i64)> {
        let (mut lx, mut ly) = (x - self.x0, y - self.y0);
        if self.tile {
            lx = lx.rem_euclid(self.stride_x);
            ly = ly.rem_euclid(self.stride_y);
        }
        if lx >= 0 && lx < self.mark_w && ly >= 0 && ly < self.mark_h {
            Some((lx, ly))
        } else {
            None
        }
    }
}

pub(crate) fn scalar(image: &PixelBuffer, params: &WatermarkParams) -> PixelBuffer {
    if params.opacity == 0.0 {
        return image.clone();
    }
    let placement = Placement::new(image, params);
    let mark = &params.image;
    let sx_scale = mark.width as f64 / placement.mark_w as f64;
    let sy_scale = mark.height as f64 / placement.mark_h as f64;
    let mark_alpha = mark.format.has_alpha();
    let gray = image.format == PixelFormat::Gray8;
    let channels = image.channels();
    let mut output = image.clone();
    let mut s = [0.0f64; 4];

    for y in 0..image.height {
        for x in 0..image.width {
            let Some((lx, ly)) = placement.local(x as i64, y as i64) else {
                continue;
            };
            bilinear(
                mark,
                (lx as f64 + 0.5) * sx_scale - 0.5,
                (ly as f64 + 0.5) * sy_scale - 0.5,
                &mut s,
            );
            let rgb = match mark.format {
                PixelFormat::Gray8 => [s[0], s[0], s[0]],
                _ => [s[0], s[1], s[2]],
            };
            let alpha = if mark_alpha { s[3] / 255.0 } else { 1.0 } * params.opacity;

            let idx = (y as usize * image.width as usize + x as usize) * channels;
            if gray {
                let lum = luminance_f64(rgb[0], rgb[1], rgb[2]);
                let base = output.pixels[idx] as f64;
                output.pixels[idx] = to_byte(base + (lum - base) * alpha);
            } else {
                for c in 0..3 {
                    let base = output.pixels[idx + c] as f64;
                    output.pixels[idx + c] = to_byte(base + (rgb[c] - base) * alpha);
                }
            }
        }
    }
    output
}

pub(crate) fn kernel(
    device: &Device,
    image: &PixelBuffer,
    params: &WatermarkParams,
) -> Result<PixelBuffer, DeviceError> {
    if params.opacity == 0.0 {
        return Ok(image.clone());
    }
    let placement = Placement::new(image, params);
    let dispatch = device.dispatch();
    let base = dispatch.upload(image)?;
    let mark: PackedImage = dispatch.upload(&params.image)?;
    let sx_scale = params.image.width as f32 / placement.mark_w as f32;
    let sy_scale = params.image.height as f32 / placement.mark_h as f32;
    let opacity = params.opacity as f32;
    let gray = image.format == PixelFormat::Gray8;
    let width = image.width as usize;

    let out = dispatch.launch(image.width, image.height, |x, y| {
        let b = base.texels[y as usize * width + x as usize];
        let Some((lx, ly)) = placement.local(x as i64, y as i64) else {
            return b;
        };
        let m = mark.sample(
            (lx as f32 + 0.5) * sx_scale - 0.5,
            (ly as f32 + 0.5) * sy_scale - 0.5,
        );
        // Packed gray and RGB texels carry alpha 1.0.
        let a = m[3] * opacity;
        if gray {
            let lum = luminance_f32(m[0], m[1], m[2]);
            let v = b[0] + (lum - b[0]) * a;
            [v, v, v, b[3]]
        } else {
            [
                b[0] + (m[0] - b[0]) * a,
                b[1] + (m[1] - b[1]) * a,
                b[2] + (m[2] - b[2]) * a,
                b[3],
            ]
        }
    })?;
    Ok(out.unpack(image.format))
}
