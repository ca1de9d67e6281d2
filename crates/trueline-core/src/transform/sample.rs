//! Scalar sampling helpers shared by the `f64` routines.

use crate::buffer::PixelBuffer;

/// Channel values of the pixel at clamped integer coordinates, as `f64`.
#[inline]
pub(crate) fn fetch(image: &PixelBuffer, x: i64, y: i64, out: &mut [f64; 4]) {
    let x = x.clamp(0, image.width as i64 - 1) as usize;
    let y = y.clamp(0, image.height as i64 - 1) as usize;
    let c = image.channels();
    let idx = (y * image.width as usize + x) * c;
    for (i, v) in image.pixels[idx..idx + c].iter().enumerate() {
        out[i] = *v as f64;
    }
}

/// Bilinear sample at continuous pixel coordinates, edge-clamped.
///
/// Fills the first `channels` entries of `out` in 0.0..=255.0 units.
pub(crate) fn bilinear(image: &PixelBuffer, x: f64, y: f64, out: &mut [f64; 4]) {
    let x = x.clamp(0.0, (image.width - 1) as f64);
    let y = y.clamp(0.0, (image.height - 1) as f64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut p00 = [0.0; 4];
    let mut p10 = [0.0; 4];
    let mut p01 = [0.0; 4];
    let mut p11 = [0.0; 4];
    fetch(image, x0, y0, &mut p00);
    fetch(image, x0 + 1, y0, &mut p10);
    fetch(image, x0, y0 + 1, &mut p01);
    fetch(image, x0 + 1, y0 + 1, &mut p11);

    for i in 0..image.channels() {
        out[i] = p00[i] * (1.0 - fx) * (1.0 - fy)
            + p10[i] * fx * (1.0 - fy)
            + p01[i] * (1.0 - fx) * fy
            + p11[i] * fx * fy;
    }
}

/// Round a 0..=255 value to a byte.
#[inline]
pub(crate) fn to_byte(v: f64) -> u8 {
    v.clamp(0.0, 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;

    #[test]
    fn test_bilinear_center_of_four() {
        let image = PixelBuffer::gray(2, 2, vec![0, 100, 100, 200]).unwrap();
        let mut out = [0.0; 4];
        bilinear(&image, 0.5, 0.5, &mut out);
        assert!((out[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_bilinear_exact_pixel() {
        let image = PixelBuffer::new(2, 1, PixelFormat::Rgb8, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut out = [0.0; 4];
        bilinear(&image, 1.0, 0.0, &mut out);
        assert_eq!(&out[..3], &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_fetch_clamps() {
        let image = PixelBuffer::gray(2, 2, vec![9, 8, 7, 6]).unwrap();
        let mut out = [0.0; 4];
        fetch(&image, -3, 10, &mut out);
        assert_eq!(out[0], 7.0);
    }

    #[test]
    fn test_to_byte() {
        assert_eq!(to_byte(-4.0), 0);
        assert_eq!(to_byte(254.6), 255);
        assert_eq!(to_byte(300.0), 255);
    }
}
