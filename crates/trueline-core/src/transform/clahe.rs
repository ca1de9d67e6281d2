//! Contrast-limited adaptive histogram equalization (CLAHE).
//!
//! # Algorithm
//!
//! 1. Split the luminance plane into a grid of tiles
//! 2. Build a 256-bin histogram per tile, clip each bin at
//!    `clip_limit * tile_pixels / 256` and spread the clipped excess evenly
//! 3. Turn each clipped histogram into a lookup table via its CDF
//! 4. Map every pixel through the four nearest tile tables and blend
//!    bilinearly by distance to the tile centers
//!
//! Color images are equalized on luminance only: each color channel is
//! shifted by the luminance change, which keeps hue. Alpha is untouched.

use serde::{Deserialize, Serialize};

use super::sample::to_byte;
use super::{check_range, TransformError};
use crate::buffer::{PixelBuffer, PixelFormat};
use crate::compute::{Device, DeviceError};

/// Largest tile count per axis.
pub const MAX_TILES: u32 = 64;

/// Local contrast settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheParams {
    /// Tiles across.
    pub tiles_x: u32,
    /// Tiles down.
    pub tiles_y: u32,
    /// Histogram clip as a multiple of the mean bin height (1 = no change).
    pub clip_limit: f64,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            tiles_x: 8,
            tiles_y: 8,
            clip_limit: 2.0,
        }
    }
}

impl ClaheParams {
    pub(crate) fn validate(&self, image: &PixelBuffer) -> Result<(), TransformError> {
        for (name, tiles, extent) in [
            ("tiles_x", self.tiles_x, image.width),
            ("tiles_y", self.tiles_y, image.height),
        ] {
            if tiles == 0 || tiles > MAX_TILES {
                return Err(TransformError::InvalidParams(format!(
                    "{name} must be within [1, {MAX_TILES}], got {tiles}"
                )));
            }
            if tiles > extent {
                return Err(TransformError::InvalidParams(format!(
                    "{name} ({tiles}) exceeds image extent ({extent})"
                )));
            }
        }
        check_range("clip_limit", self.clip_limit, 1.0, 256.0)
    }
}

/// Tile geometry for one image.
#[derive(Debug, Clone, Copy)]
struct TileGrid {
    tile_w: u32,
    tile_h: u32,
    cols: u32,
    rows: u32,
}

impl TileGrid {
    fn new(width: u32, height: u32, params: &ClaheParams) -> Self {
        let tile_w = width.div_ceil(params.tiles_x.max(1));
        let tile_h = height.div_ceil(params.tiles_y.max(1));
        Self {
            tile_w,
            tile_h,
            cols: width.div_ceil(tile_w),
            rows: height.div_ceil(tile_h),
        }
    }

    fn count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    /// Pixel bounds `(x0, y0, x1, y1)` of tile `index`, exclusive end.
    fn bounds(&self, index: usize, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let tx = index as u32 % self.cols;
        let ty = index as u32 / self.cols;
        let x0 = tx * self.tile_w;
        let y0 = ty * self.tile_h;
        (
            x0,
            y0,
            (x0 + self.tile_w).min(width),
            (y0 + self.tile_h).min(height),
        )
    }
}

/// Build the equalization table for one tile of `luma`.
///
/// Excess above the clip height is spread over all bins, with the remainder
/// going one count each to the lowest bins. The table maps through the
/// rounded CDF: `lut[v] = round(cdf[v] * 255 / n)`.
pub(crate) fn tile_lut(luma: &[u8], width: u32, bounds: (u32, u32, u32, u32), clip_limit: f64) -> [u8; 256] {
    let (x0, y0, x1, y1) = bounds;
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        let row = (y * width) as usize;
        for &v in &luma[row + x0 as usize..row + x1 as usize] {
            hist[v as usize] += 1;
        }
    }
    let n = (x1 - x0) * (y1 - y0);
    let limit = ((clip_limit * n as f64 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    let n = n as u64;
    for (v, &count) in hist.iter().enumerate() {
        cdf += count as u64;
        lut[v] = ((cdf * 255 + n / 2) / n).min(255) as u8;
    }
    lut
}

/// Nearest tile indices and blend weight along one axis.
#[inline]
fn axis_blend(pos: f64, tile: f64, count: u32) -> (u32, u32, f64) {
    let g = (pos + 0.5) / tile - 0.5;
    let last = count - 1;
    if g <= 0.0 {
        return (0, 0, 0.0);
    }
    let i0 = (g.floor() as u32).min(last);
    if i0 >= last {
        return (last, last, 0.0);
    }
    (i0, i0 + 1, g - i0 as f64)
}

pub(crate) fn scalar(image: &PixelBuffer, params: &ClaheParams) -> PixelBuffer {
    let (width, height) = (image.width, image.height);
    let luma = image.luma_plane();
    let grid = TileGrid::new(width, height, params);
    let luts: Vec<[u8; 256]> = (0..grid.count())
        .map(|i| tile_lut(&luma, width, grid.bounds(i, width, height), params.clip_limit))
        .collect();

    let channels = image.channels();
    let color = image.format.color_channels();
    let mut output = image.clone();

    for y in 0..height {
        let (ty0, ty1, fy) = axis_blend(y as f64, grid.tile_h as f64, grid.rows);
        for x in 0..width {
            let (tx0, tx1, fx) = axis_blend(x as f64, grid.tile_w as f64, grid.cols);
            let idx = (y * width + x) as usize;
            let l = luma[idx] as usize;
            let at = |tx: u32, ty: u32| luts[(ty * grid.cols + tx) as usize][l] as f64;

            let top = at(tx0, ty0) * (1.0 - fx) + at(tx1, ty0) * fx;
            let bottom = at(tx0, ty1) * (1.0 - fx) + at(tx1, ty1) * fx;
            let mapped = top * (1.0 - fy) + bottom * fy;

            let base = idx * channels;
            if image.format == PixelFormat::Gray8 {
                output.pixels[base] = to_byte(mapped);
            } else {
                let delta = mapped - l as f64;
                for c in 0..color {
                    output.pixels[base + c] = to_byte(image.pixels[base + c] as f64 + delta);
                }
            }
        }
    }
    output
}

pub(crate) fn kernel(
    device: &Device,
    image: &PixelBuffer,
    params: &ClaheParams,
) -> Result<PixelBuffer, DeviceError> {
    let (width, height) = (image.width, image.height);
    let dispatch = device.dispatch();
    let src = dispatch.upload(image)?;
    let luma = image.luma_plane();
    let grid = TileGrid::new(width, height, params);

    // Reduction pass: one group per tile, tables normalized for the blend.
    let luts: Vec<[f32; 256]> = dispatch.launch_groups(grid.count(), |i| {
        let lut = tile_lut(&luma, width, grid.bounds(i, width, height), params.clip_limit);
        let mut table = [0.0f32; 256];
        for (t, &v) in table.iter_mut().zip(lut.iter()) {
            *t = v as f32 / 255.0;
        }
        table
    })?;

    let tile_w = grid.tile_w as f32;
    let tile_h = grid.tile_h as f32;
    let gray = image.format == PixelFormat::Gray8;

    let out = dispatch.launch(width, height, |x, y| {
        let blend = |pos: u32, tile: f32, count: u32| -> (u32, u32, f32) {
            let g = (pos as f32 + 0.5) / tile - 0.5;
            let i0 = g.max(0.0).floor() as u32;
            let i0 = i0.min(count - 1);
            let i1 = (i0 + 1).min(count - 1);
            let f = if g <= 0.0 || i0 == i1 { 0.0 } else { g - i0 as f32 };
            (i0, i1, f)
        };
        let (tx0, tx1, fx) = blend(x, tile_w, grid.cols);
        let (ty0, ty1, fy) = blend(y, tile_h, grid.rows);
        let idx = (y * width + x) as usize;
        let l = luma[idx] as usize;
        let at = |tx: u32, ty: u32| luts[(ty * grid.cols + tx) as usize][l];

        let top = at(tx0, ty0) + (at(tx1, ty0) - at(tx0, ty0)) * fx;
        let bottom = at(tx0, ty1) + (at(tx1, ty1) - at(tx0, ty1)) * fx;
        let mapped = top + (bottom - top) * fy;

        let t = src.texels[idx];
        if gray {
            [mapped, mapped, mapped, t[3]]
        } else {
            let delta = mapped - l as f32 / 255.0;
            [t[0] + delta, t[1] + delta, t[2] + delta, t[3]]
        }
    })?;
    Ok(out.unpack(image.format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::{device, max_channel_diff, textured};

    fn low_contrast(width: u32, height: u32) -> PixelBuffer {
        let pixels = (0..width * height)
            .map(|i| 100 + ((i % width) * 20 / width) as u8 + ((i / width) % 3) as u8)
            .collect();
        PixelBuffer::gray(width, height, pixels).unwrap()
    }

    fn range(values: &[u8]) -> u8 {
        values.iter().max().unwrap() - values.iter().min().unwrap()
    }

    // ===== Tables =====

    #[test]
    fn test_tile_lut_is_monotonic() {
        let image = textured(32, 32, PixelFormat::Gray8);
        let lut = tile_lut(&image.pixels, 32, (0, 0, 32, 32), 2.0);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn test_tile_lut_clip_limits_slope() {
        // Single-valued tile: unclipped equalization would jump 0 -> 255.
        let luma = vec![128u8; 16 * 16];
        let lut = tile_lut(&luma, 16, (0, 0, 16, 16), 2.0);
        // Clipped at 2 counts per bin; the other 254 counts are spread, so the
        // table stays close to identity around the spike.
        assert!(lut[128].abs_diff(128) <= 4, "lut[128] = {}", lut[128]);
    }

    #[test]
    fn test_tile_grid_covers_image() {
        let grid = TileGrid::new(100, 30, &ClaheParams::default());
        assert_eq!((grid.tile_w, grid.tile_h), (13, 4));
        assert_eq!((grid.cols, grid.rows), (8, 8));
        let (_, _, x1, y1) = grid.bounds(grid.count() - 1, 100, 30);
        assert_eq!((x1, y1), (100, 30));
    }

    #[test]
    fn test_axis_blend_edges() {
        assert_eq!(axis_blend(0.0, 10.0, 4), (0, 0, 0.0));
        assert_eq!(axis_blend(39.0, 10.0, 4), (3, 3, 0.0));
        let (a, b, f) = axis_blend(9.5, 10.0, 4);
        assert_eq!((a, b), (0, 1));
        assert!((f - 0.5).abs() < 1e-12);
    }

    // ===== Output =====

    #[test]
    fn test_expands_low_contrast() {
        let image = low_contrast(64, 48);
        let params = ClaheParams {
            tiles_x: 4,
            tiles_y: 4,
            clip_limit: 4.0,
        };
        let out = scalar(&image, &params);
        assert!(range(&out.pixels) > range(&image.pixels));
    }

    #[test]
    fn test_color_shifts_by_luminance() {
        let image = textured(32, 32, PixelFormat::Rgba8);
        let out = scalar(&image, &ClaheParams::default());
        for (a, b) in image.pixels.chunks_exact(4).zip(out.pixels.chunks_exact(4)) {
            assert_eq!(a[3], b[3]);
            // Same shift on every channel unless one of them clipped.
            if b[..3].iter().all(|&v| v > 0 && v < 255) {
                let d0 = b[0] as i32 - a[0] as i32;
                let d1 = b[1] as i32 - a[1] as i32;
                assert!((d0 - d1).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_validate() {
        let image = textured(16, 8, PixelFormat::Gray8);
        assert!(ClaheParams::default().validate(&image).is_ok());
        let too_many = ClaheParams {
            tiles_y: 9,
            ..Default::default()
        };
        assert!(too_many.validate(&image).is_err());
        let bad_clip = ClaheParams {
            clip_limit: 0.5,
            ..Default::default()
        };
        assert!(bad_clip.validate(&image).is_err());
    }

    #[test]
    fn test_kernel_matches_scalar() {
        let device = device();
        let params = ClaheParams {
            tiles_x: 4,
            tiles_y: 3,
            clip_limit: 3.0,
        };
        for format in [PixelFormat::Gray8, PixelFormat::Rgb8, PixelFormat::Rgba8] {
            let image = textured(50, 37, format);
            let a = scalar(&image, &params);
            let b = kernel(&device, &image, &params).unwrap();
            assert!(max_channel_diff(&a, &b) <= 1, "format {:?}", format);
        }
    }
}
