//! Down-sampling for detection working previews and batch previews.
//!
//! Uses the `image` crate's Triangle (bilinear) filter. Both functions return
//! new buffers without modifying the input.

use image::imageops::{self, FilterType};

use super::{BufferError, PixelBuffer, PixelFormat};

/// Resize a buffer to fit within `max_edge` while preserving aspect ratio.
///
/// Buffers that already fit are returned as a clone; images are never
/// up-scaled.
pub fn resize_to_fit(buffer: &PixelBuffer, max_edge: u32) -> Result<PixelBuffer, BufferError> {
    buffer.validate()?;
    if max_edge == 0 {
        return Err(BufferError::InvalidDimensions {
            width: 0,
            height: 0,
        });
    }

    if buffer.width <= max_edge && buffer.height <= max_edge {
        return Ok(buffer.clone());
    }

    let (new_width, new_height) = calculate_fit_dimensions(buffer.width, buffer.height, max_edge);
    let pixels = match buffer.format {
        PixelFormat::Gray8 => {
            let img = image::GrayImage::from_raw(buffer.width, buffer.height, buffer.pixels.clone())
                .ok_or_else(|| BufferError::Resize("Failed to create GrayImage".to_string()))?;
            imageops::resize(&img, new_width, new_height, FilterType::Triangle).into_raw()
        }
        PixelFormat::Rgb8 => {
            let img = image::RgbImage::from_raw(buffer.width, buffer.height, buffer.pixels.clone())
                .ok_or_else(|| BufferError::Resize("Failed to create RgbImage".to_string()))?;
            imageops::resize(&img, new_width, new_height, FilterType::Triangle).into_raw()
        }
        PixelFormat::Rgba8 => {
            let img = image::RgbaImage::from_raw(buffer.width, buffer.height, buffer.pixels.clone())
                .ok_or_else(|| BufferError::Resize("Failed to create RgbaImage".to_string()))?;
            imageops::resize(&img, new_width, new_height, FilterType::Triangle).into_raw()
        }
    };

    PixelBuffer::new(new_width, new_height, buffer.format, pixels)
}

/// Build the grayscale working preview used by straightening detection.
///
/// Converts to luminance first and then down-samples, so colour images are
/// resampled on one plane instead of three.
pub fn working_preview(buffer: &PixelBuffer, max_edge: u32) -> Result<image::GrayImage, BufferError> {
    buffer.validate()?;
    let luma = buffer.to_luma_image()?;
    if max_edge == 0 || (buffer.width <= max_edge && buffer.height <= max_edge) {
        return Ok(luma);
    }
    let (w, h) = calculate_fit_dimensions(buffer.width, buffer.height, max_edge);
    Ok(imageops::resize(&luma, w, h, FilterType::Triangle))
}

/// Calculate dimensions to fit within max_edge while preserving aspect ratio.
pub(crate) fn calculate_fit_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }

    let ratio = width as f64 / height as f64;

    if width >= height {
        let new_height = (max_edge as f64 / ratio).round() as u32;
        (max_edge, new_height.max(1))
    } else {
        let new_width = (max_edge as f64 * ratio).round() as u32;
        (new_width.max(1), max_edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_buffer(width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        let mut pixels = Vec::with_capacity(PixelBuffer::expected_len(width, height, format));
        for y in 0..height {
            for x in 0..width {
                for c in 0..format.channels() {
                    pixels.push(((x * 7 + y * 3 + c as u32 * 50) % 256) as u8);
                }
            }
        }
        PixelBuffer::new(width, height, format, pixels).unwrap()
    }

    #[test]
    fn test_resize_to_fit_landscape() {
        let buffer = create_test_buffer(1000, 800, PixelFormat::Gray8);
        let resized = resize_to_fit(&buffer, 500).unwrap();
        assert_eq!((resized.width, resized.height), (500, 400));
        assert_eq!(resized.format, PixelFormat::Gray8);
        assert_eq!(resized.pixels.len(), 500 * 400);
    }

    #[test]
    fn test_resize_to_fit_portrait_rgba() {
        let buffer = create_test_buffer(300, 600, PixelFormat::Rgba8);
        let resized = resize_to_fit(&buffer, 200).unwrap();
        assert_eq!((resized.width, resized.height), (100, 200));
        assert_eq!(resized.pixels.len(), 100 * 200 * 4);
    }

    #[test]
    fn test_resize_to_fit_already_smaller() {
        let buffer = create_test_buffer(100, 50, PixelFormat::Rgb8);
        let resized = resize_to_fit(&buffer, 256).unwrap();
        assert_eq!(resized, buffer);
    }

    #[test]
    fn test_resize_to_fit_zero_max_edge_error() {
        let buffer = create_test_buffer(100, 50, PixelFormat::Rgb8);
        assert!(resize_to_fit(&buffer, 0).is_err());
    }

    #[test]
    fn test_working_preview_is_gray_and_bounded() {
        let buffer = create_test_buffer(1600, 1200, PixelFormat::Rgb8);
        let preview = working_preview(&buffer, 800).unwrap();
        assert_eq!(preview.dimensions(), (800, 600));
    }

    #[test]
    fn test_working_preview_small_image_unchanged() {
        let buffer = create_test_buffer(120, 90, PixelFormat::Gray8);
        let preview = working_preview(&buffer, 800).unwrap();
        assert_eq!(preview.as_raw(), &buffer.pixels);
    }

    #[test]
    fn test_calculate_fit_dimensions() {
        assert_eq!(calculate_fit_dimensions(6000, 4000, 2560), (2560, 1707));
        assert_eq!(calculate_fit_dimensions(4000, 6000, 2560), (1707, 2560));
        assert_eq!(calculate_fit_dimensions(4000, 4000, 256), (256, 256));
        assert_eq!(calculate_fit_dimensions(0, 0, 256), (0, 0));
    }
}
