//! Normalized RGBA texel storage used by device kernels.
//!
//! Every buffer format is widened to four `f32` channels in 0.0..=1.0 before a
//! kernel runs and narrowed back afterwards:
//! - `Gray8` -> `[v, v, v, 1.0]`
//! - `Rgb8` -> `[r, g, b, 1.0]`
//! - `Rgba8` -> `[r, g, b, a]`

use crate::buffer::{PixelBuffer, PixelFormat};

/// One normalized RGBA sample.
pub type Texel = [f32; 4];

/// A texel grid with the same dimensions as the buffer it was packed from.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Texel>,
}

impl PackedImage {
    /// Widen a pixel buffer into normalized texels.
    pub fn pack(buffer: &PixelBuffer) -> Self {
        const INV: f32 = 1.0 / 255.0;
        let texels = match buffer.format {
            PixelFormat::Gray8 => buffer
                .pixels
                .iter()
                .map(|&v| {
                    let v = v as f32 * INV;
                    [v, v, v, 1.0]
                })
                .collect(),
            PixelFormat::Rgb8 => buffer
                .pixels
                .chunks_exact(3)
                .map(|p| [p[0] as f32 * INV, p[1] as f32 * INV, p[2] as f32 * INV, 1.0])
                .collect(),
            PixelFormat::Rgba8 => buffer
                .pixels
                .chunks_exact(4)
                .map(|p| {
                    [
                        p[0] as f32 * INV,
                        p[1] as f32 * INV,
                        p[2] as f32 * INV,
                        p[3] as f32 * INV,
                    ]
                })
                .collect(),
        };
        Self {
            width: buffer.width,
            height: buffer.height,
            texels,
        }
    }

    /// Narrow texels back to an 8-bit buffer of the requested format.
    ///
    /// Gray output takes the first channel; kernels writing gray results keep
    /// all three color channels equal.
    pub fn unpack(&self, format: PixelFormat) -> PixelBuffer {
        let mut pixels = Vec::with_capacity(self.texels.len() * format.channels());
        for t in &self.texels {
            match format {
                PixelFormat::Gray8 => pixels.push(to_byte(t[0])),
                PixelFormat::Rgb8 => pixels.extend_from_slice(&[to_byte(t[0]), to_byte(t[1]), to_byte(t[2])]),
                PixelFormat::Rgba8 => pixels.extend_from_slice(&[
                    to_byte(t[0]),
                    to_byte(t[1]),
                    to_byte(t[2]),
                    to_byte(t[3]),
                ]),
            }
        }
        PixelBuffer {
            width: self.width,
            height: self.height,
            format,
            pixels,
        }
    }

    /// Texel at integer coordinates, clamped to the grid.
    #[inline]
    pub fn fetch(&self, x: i64, y: i64) -> Texel {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width as usize + x]
    }

    /// Bilinear sample at continuous pixel coordinates, edge-clamped.
    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> Texel {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);

        let mut out = [0.0f32; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
