//! Luminance helpers using ITU-R BT.709 coefficients.
//!
//! Shared by the edge extractor (grayscale working preview), the tone
//! primitive (highlight/shadow masks), local contrast enhancement and
//! watermark compositing onto grayscale buffers.

/// ITU-R BT.709 coefficient for red channel in luminance calculation.
pub const LUMINANCE_R: f32 = 0.2126;

/// ITU-R BT.709 coefficient for green channel in luminance calculation.
pub const LUMINANCE_G: f32 = 0.7152;

/// ITU-R BT.709 coefficient for blue channel in luminance calculation.
pub const LUMINANCE_B: f32 = 0.0722;

/// Luminance of normalized RGB values (0.0 to 1.0), single precision.
///
/// Used by the device kernels, which work on packed `f32` texels.
#[inline]
pub fn luminance_f32(r: f32, g: f32, b: f32) -> f32 {
    LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b
}

/// Luminance of RGB values in any consistent unit, double precision.
///
/// Used by the scalar routines.
#[inline]
pub fn luminance_f64(r: f64, g: f64, b: f64) -> f64 {
    LUMINANCE_R as f64 * r + LUMINANCE_G as f64 * g + LUMINANCE_B as f64 * b
}

/// Luminance of 8-bit RGB values, rounded to the nearest level.
#[inline]
pub fn luminance_u8(r: u8, g: u8, b: u8) -> u8 {
    let lum = luminance_f64(r as f64, g as f64, b as f64);
    lum.clamp(0.0, 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficients_sum_to_one() {
        let sum = LUMINANCE_R + LUMINANCE_G + LUMINANCE_B;
        assert!((sum - 1.0).abs() < 1e-6, "Coefficients should sum to 1.0");
    }

    #[test]
    fn test_gray_maps_to_itself() {
        for v in [0u8, 1, 64, 128, 200, 255] {
            assert_eq!(luminance_u8(v, v, v), v);
        }
    }

    #[test]
    fn test_green_dominates() {
        assert!(luminance_u8(0, 255, 0) > luminance_u8(255, 0, 0));
        assert!(luminance_u8(255, 0, 0) > luminance_u8(0, 0, 255));
    }

    #[test]
    fn test_precisions_agree() {
        let (r, g, b) = (0.3f32, 0.6f32, 0.9f32);
        let single = luminance_f32(r, g, b) as f64;
        let double = luminance_f64(r as f64, g as f64, b as f64);
        assert!((single - double).abs() < 1e-6);
    }
}
