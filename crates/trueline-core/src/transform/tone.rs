//! Global tone adjustment.
//!
//! ## Adjustment Order
//! 1. Exposure
//! 2. Brightness
//! 3. Contrast
//! 4. Highlights
//! 5. Shadows
//!
//! Highlights and shadows are masked by the luminance measured after
//! contrast. Alpha is carried through unchanged.

use serde::{Deserialize, Serialize};

use super::sample::to_byte;
use super::{check_range, TransformError};
use crate::buffer::PixelBuffer;
use crate::compute::{Device, DeviceError};
use crate::luminance::{luminance_f32, luminance_f64};

/// Tone settings. All zero is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneParams {
    /// Exposure in stops (-5 to +5).
    pub exposure: f64,
    /// Brightness offset (-100 to +100).
    pub brightness: f64,
    /// Contrast around mid-gray (-100 to +100).
    pub contrast: f64,
    /// Bright-area recovery or boost (-100 to +100).
    pub highlights: f64,
    /// Dark-area deepening or lift (-100 to +100).
    pub shadows: f64,
}

impl ToneParams {
    /// Check if all values are at their neutral setting.
    pub fn is_identity(&self) -> bool {
        self.exposure == 0.0
            && self.brightness == 0.0
            && self.contrast == 0.0
            && self.highlights == 0.0
            && self.shadows == 0.0
    }

    pub(crate) fn validate(&self) -> Result<(), TransformError> {
        check_range("exposure", self.exposure, -5.0, 5.0)?;
        check_range("brightness", self.brightness, -100.0, 100.0)?;
        check_range("contrast", self.contrast, -100.0, 100.0)?;
        check_range("highlights", self.highlights, -100.0, 100.0)?;
        check_range("shadows", self.shadows, -100.0, 100.0)
    }
}

/// Smooth interpolation function.
///
/// Returns 0 for x <= edge0, 1 for x >= edge1,
/// and smoothly interpolates between.
#[inline]
fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Tone-map normalized color values in place (one value for gray, three for color).
fn tone_values(values: &mut [f64], p: &ToneParams) {
    let gain = 2.0_f64.powf(p.exposure);
    let offset = p.brightness / 400.0;
    let factor = 1.0 + p.contrast / 100.0;
    for v in values.iter_mut() {
        *v = ((*v * gain + offset) - 0.5) * factor + 0.5;
    }

    let lum = match values {
        [r, g, b] => luminance_f64(*r, *g, *b),
        [v] => *v,
        _ => return,
    };

    if p.highlights != 0.0 {
        let adjustment = (p.highlights / 100.0) * smoothstep(0.5, 1.0, lum);
        for v in values.iter_mut() {
            if p.highlights < 0.0 {
                *v *= 1.0 + adjustment;
            } else {
                *v += adjustment * 0.5;
            }
        }
    }
    if p.shadows != 0.0 {
        let adjustment = (p.shadows / 100.0) * smoothstep(0.5, 0.0, lum);
        for v in values.iter_mut() {
            if p.shadows < 0.0 {
                *v *= 1.0 + adjustment;
            } else {
                *v += adjustment * 0.5;
            }
        }
    }
}

pub(crate) fn scalar(image: &PixelBuffer, params: &ToneParams) -> PixelBuffer {
    if params.is_identity() {
        return image.clone();
    }
    let color = image.format.color_channels();
    let mut output = image.clone();
    let mut values = [0.0f64; 3];
    for px in output.pixels.chunks_exact_mut(image.channels()) {
        for i in 0..color {
            values[i] = px[i] as f64 / 255.0;
        }
        tone_values(&mut values[..color], params);
        for i in 0..color {
            px[i] = to_byte(values[i] * 255.0);
        }
    }
    output
}

pub(crate) fn kernel(
    device: &Device,
    image: &PixelBuffer,
    params: &ToneParams,
) -> Result<PixelBuffer, DeviceError> {
    if params.is_identity() {
        return Ok(image.clone());
    }
    let dispatch = device.dispatch();
    let src = dispatch.upload(image)?;
    let gain = 2.0_f32.powf(params.exposure as f32);
    let offset = params.brightness as f32 / 400.0;
    let factor = 1.0 + params.contrast as f32 / 100.0;
    let highlights = params.highlights as f32 / 100.0;
    let shadows = params.shadows as f32 / 100.0;
    let width = image.width as usize;

    let out = dispatch.launch(image.width, image.height, |x, y| {
        let t = src.texels[y as usize * width + x as usize];
        let mut c = [0.0f32; 3];
        for i in 0..3 {
            c[i] = ((t[i] * gain + offset) - 0.5) * factor + 0.5;
        }
        let lum = luminance_f32(c[0], c[1], c[2]);

        if highlights != 0.0 {
            let s = ((lum - 0.5) * 2.0).clamp(0.0, 1.0);
            let adj = highlights * s * s * (3.0 - 2.0 * s);
            for v in &mut c {
                *v = if highlights < 0.0 { *v * (1.0 + adj) } else { *v + adj * 0.5 };
            }
        }
        if shadows != 0.0 {
            let s = ((0.5 - lum) * 2.0).clamp(0.0, 1.0);
            let adj = shadows * s * s * (3.0 - 2.0 * s);
            for v in &mut c {
                *v = if shadows < 0.0 { *v * (1.0 + adj) } else { *v + adj * 0.5 };
            }
        }
        [c[0], c[1], c[2], t[3]]
    })?;
    Ok(out.unpack(image.format))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn tone_strategy() -> impl Strategy<Value = ToneParams> {
        (
            -2.0f64..2.0,
            -100.0f64..100.0,
            -100.0f64..100.0,
            -100.0f64..100.0,
            -100.0f64..100.0,
        )
            .prop_map(|(exposure, brightness, contrast, highlights, shadows)| ToneParams {
                exposure,
                brightness,
                contrast,
                highlights,
                shadows,
            })
    }

    proptest! {
        #[test]
        fn prop_exposure_is_monotonic(a in 0u8..=255, b in 0u8..=255, ev in -3.0f64..3.0) {
            let params = ToneParams { exposure: ev, ..Default::default() };
            let image = PixelBuffer::gray(2, 1, vec![a, b]).unwrap();
            let out = scalar(&image, &params);
            if a <= b {
                prop_assert!(out.pixels[0] <= out.pixels[1]);
            } else {
                prop_assert!(out.pixels[0] >= out.pixels[1]);
            }
        }

        #[test]
        fn prop_output_shape_matches_input(params in tone_strategy()) {
            let image = PixelBuffer::filled(5, 3, crate::buffer::PixelFormat::Rgb8, &[90, 140, 210]).unwrap();
            let out = scalar(&image, &params);
            prop_assert_eq!(out.pixels.len(), image.pixels.len());
            prop_assert_eq!((out.width, out.height), (5, 3));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_kernel_matches_scalar(params in tone_strategy()) {
            let device = crate::transform::test_support::device();
            let image = crate::transform::test_support::textured(24, 16, crate::buffer::PixelFormat::Rgba8);
            let a = scalar(&image, &params);
            let b = kernel(&device, &image, &params).unwrap();
            prop_assert!(crate::transform::test_support::max_channel_diff(&a, &b) <= 1);
        }
    }
}
