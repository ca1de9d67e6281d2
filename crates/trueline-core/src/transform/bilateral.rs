//! Edge-preserving bilateral smoothing.
//!
//! Each output pixel is a weighted mean of its `(2r+1)^2` neighborhood, where
//! the weight is the product of a spatial Gaussian (distance in pixels) and
//! a range Gaussian (color distance in 8-bit levels). Neighbors across a
//! strong edge differ a lot in color, get almost no weight, and the edge
//! survives. Borders replicate the nearest pixel. Alpha is not filtered.

use serde::{Deserialize, Serialize};

use super::sample::{fetch, to_byte};
use super::{check_range, TransformError};
use crate::buffer::PixelBuffer;
use crate::compute::{Device, DeviceError};

/// Largest accepted window radius.
pub const MAX_RADIUS: u32 = 15;

/// Bilateral filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralParams {
    /// Window radius in pixels (1 to 15).
    pub radius: u32,
    /// Spatial sigma in pixels.
    pub sigma_spatial: f64,
    /// Range sigma in 8-bit levels. Smaller keeps more edges.
    pub sigma_range: f64,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            radius: 3,
            sigma_spatial: 2.0,
            sigma_range: 25.0,
        }
    }
}

impl BilateralParams {
    pub(crate) fn validate(&self) -> Result<(), TransformError> {
        if self.radius == 0 || self.radius > MAX_RADIUS {
            return Err(TransformError::InvalidParams(format!(
                "radius must be within [1, {MAX_RADIUS}], got {}",
                self.radius
            )));
        }
        check_range("sigma_spatial", self.sigma_spatial, 0.1, 100.0)?;
        check_range("sigma_range", self.sigma_range, 0.1, 1000.0)
    }
}

pub(crate) fn scalar(image: &PixelBuffer, params: &BilateralParams) -> PixelBuffer {
    let r = params.radius as i64;
    let spatial_denom = 2.0 * params.sigma_spatial * params.sigma_spatial;
    let range_denom = 2.0 * params.sigma_range * params.sigma_range;
    let color = image.format.color_channels();
    let channels = image.channels();
    let mut output = image.clone();
    let mut center = [0.0f64; 4];
    let mut neighbor = [0.0f64; 4];

    for y in 0..image.height as i64 {
        for x in 0..image.width as i64 {
            fetch(image, x, y, &mut center);
            let mut sum = [0.0f64; 3];
            let mut weight_sum = 0.0;

            for dy in -r..=r {
                for dx in -r..=r {
                    fetch(image, x + dx, y + dy, &mut neighbor);
                    let dist2 = (dx * dx + dy * dy) as f64;
                    let mut range2 = 0.0;
                    for c in 0..color {
                        let d = neighbor[c] - center[c];
                        range2 += d * d;
                    }
                    let w = (-dist2 / spatial_denom - range2 / range_denom).exp();
                    for c in 0..color {
                        sum[c] += neighbor[c] * w;
                    }
                    weight_sum += w;
                }
            }

            let idx = (y as usize * image.width as usize + x as usize) * channels;
            for c in 0..color {
                output.pixels[idx + c] = to_byte(sum[c] / weight_sum);
            }
        }
    }
    output
}

pub(crate) fn kernel(
    device: &Device,
    image: &PixelBuffer,
    params: &BilateralParams,
) -> Result<PixelBuffer, DeviceError> {
    let dispatch = device.dispatch();
    let src = dispatch.upload(image)?;
    let r = params.radius as i64;
    let side = (2 * r + 1) as usize;

    // Spatial weights do not depend on the pixel, so tabulate them once.
    let inv_spatial = -1.0 / (2.0 * params.sigma_spatial * params.sigma_spatial) as f32;
    let mut spatial = Vec::with_capacity(side * side);
    for dy in -r..=r {
        for dx in -r..=r {
            spatial.push(((dx * dx + dy * dy) as f32 * inv_spatial).exp());
        }
    }
    let sigma_range = params.sigma_range as f32 / 255.0;
    let inv_range = -1.0 / (2.0 * sigma_range * sigma_range);
    let color = image.format.color_channels();

    let out = dispatch.launch(image.width, image.height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let center = src.fetch(x, y);
        let mut sum = [0.0f32; 3];
        let mut weight_sum = 0.0f32;
        let mut k = 0;
        for dy in -r..=r {
            for dx in -r..=r {
                let n = src.fetch(x + dx, y + dy);
                let mut range2 = 0.0f32;
                for c in 0..color {
                    let d = n[c] - center[c];
                    range2 += d * d;
                }
                let w = spatial[k] * (range2 * inv_range).exp();
                k += 1;
                for c in 0..3 {
                    sum[c] += n[c] * w;
                }
                weight_sum += w;
            }
        }
        [
            sum[0] / weight_sum,
            sum[1] / weight_sum,
            sum[2] / weight_sum,
            center[3],
        ]
    })?;
    Ok(out.unpack(image.format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;
    use crate::transform::test_support::{device, max_channel_diff, textured};

    fn variance(values: &[u8]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n
    }

    #[test]
    fn test_constant_image_unchanged() {
        let image = PixelBuffer::filled(12, 9, PixelFormat::Rgb8, &[40, 90, 200]).unwrap();
        assert_eq!(scalar(&image, &BilateralParams::default()), image);
    }

    #[test]
    fn test_step_edge_preserved() {
        let (w, h) = (20u32, 10u32);
        let pixels = (0..w * h).map(|i| if i % w < w / 2 { 50 } else { 200 }).collect();
        let image = PixelBuffer::gray(w, h, pixels).unwrap();
        let out = scalar(&image, &BilateralParams::default());
        assert!(out.pixel(9, 5)[0].abs_diff(50) <= 2);
        assert!(out.pixel(10, 5)[0].abs_diff(200) <= 2);
    }

    #[test]
    fn test_noise_reduced() {
        let (w, h) = (32u32, 32u32);
        let mut state = 12345u32;
        let pixels: Vec<u8> = (0..w * h)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (128 + ((state >> 16) % 21) as i32 - 10) as u8
            })
            .collect();
        let image = PixelBuffer::gray(w, h, pixels).unwrap();
        let out = scalar(&image, &BilateralParams::default());
        assert!(variance(&out.pixels) < variance(&image.pixels) * 0.5);
    }

    #[test]
    fn test_alpha_untouched() {
        let image = textured(16, 16, PixelFormat::Rgba8);
        let out = scalar(&image, &BilateralParams::default());
        for (a, b) in image.pixels.chunks_exact(4).zip(out.pixels.chunks_exact(4)) {
            assert_eq!(a[3], b[3]);
        }
    }

    #[test]
    fn test_validate() {
        assert!(BilateralParams::default().validate().is_ok());
        for radius in [0, MAX_RADIUS + 1] {
            let params = BilateralParams {
                radius,
                ..Default::default()
            };
            assert!(params.validate().is_err(), "radius {radius}");
        }
        let params = BilateralParams {
            sigma_range: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_kernel_matches_scalar() {
        let device = device();
        let params = BilateralParams {
            radius: 2,
            sigma_spatial: 1.5,
            sigma_range: 30.0,
        };
        for format in [PixelFormat::Gray8, PixelFormat::Rgb8, PixelFormat::Rgba8] {
            let image = textured(40, 24, format);
            let a = scalar(&image, &params);
            let b = kernel(&device, &image, &params).unwrap();
            assert!(max_channel_diff(&a, &b) <= 1, "format {:?}", format);
        }
    }
}
