//! Core pixel buffer types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::luminance::luminance_u8;

/// Error types for pixel buffer construction and conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Width or height is zero.
    #[error("Invalid buffer dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The byte length does not match `width * height * channels`.
    #[error("Pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The channel count does not correspond to a supported format.
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    /// Resampling through the `image` crate failed.
    #[error("Resize failed: {0}")]
    Resize(String),
}

/// Memory layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Single-channel 8-bit intensity.
    Gray8,
    /// Three-channel 8-bit color.
    #[default]
    Rgb8,
    /// Four-channel 8-bit color with straight (non-premultiplied) alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Number of channels carrying color or intensity (alpha excluded).
    #[inline]
    pub fn color_channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => 3,
        }
    }

    /// Whether the last channel is alpha.
    #[inline]
    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8)
    }

    /// Resolve a format from a channel count (1, 3 or 4).
    pub fn from_channels(channels: u8) -> Result<Self, BufferError> {
        match channels {
            1 => Ok(PixelFormat::Gray8),
            3 => Ok(PixelFormat::Rgb8),
            4 => Ok(PixelFormat::Rgba8),
            other => Err(BufferError::UnsupportedChannels(other)),
        }
    }
}

/// A decoded image owned by whichever stage currently holds it.
///
/// Transforms never mutate a buffer they were handed; they always build and
/// return a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Channel layout of `pixels`.
    pub format: PixelFormat,
    /// Pixel data in row-major order, `channels` bytes per pixel.
    pub pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Create a buffer, checking that the pixel data matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, BufferError> {
        let buffer = Self {
            width,
            height,
            format,
            pixels,
        };
        buffer.validate()?;
        Ok(buffer)
    }

    /// Create a single-channel buffer.
    pub fn gray(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BufferError> {
        Self::new(width, height, PixelFormat::Gray8, pixels)
    }

    /// Create a buffer where every pixel holds `value`.
    ///
    /// `value` must have exactly `format.channels()` entries.
    pub fn filled(
        width: u32,
        height: u32,
        format: PixelFormat,
        value: &[u8],
    ) -> Result<Self, BufferError> {
        if value.len() != format.channels() {
            return Err(BufferError::SizeMismatch {
                expected: format.channels(),
                actual: value.len(),
            });
        }
        let count = width as usize * height as usize;
        let pixels = value
            .iter()
            .copied()
            .cycle()
            .take(count * value.len())
            .collect();
        Self::new(width, height, format, pixels)
    }

    /// Expected byte length for the given dimensions and format.
    #[inline]
    pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
        width as usize * height as usize * format.channels()
    }

    /// Check the dimension and length invariants.
    ///
    /// Fields are public, so buffers built by struct literal (or received over
    /// a binding layer) are re-checked before any pixel work.
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.width == 0 || self.height == 0 {
            return Err(BufferError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = Self::expected_len(self.width, self.height, self.format);
        if self.pixels.len() != expected {
            return Err(BufferError::SizeMismatch {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Bytes per pixel.
    #[inline]
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Get the total number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Channel bytes of the pixel at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels();
        let idx = (y as usize * self.width as usize + x as usize) * c;
        &self.pixels[idx..idx + c]
    }

    /// BT.709 luminance plane, one byte per pixel.
    pub fn luma_plane(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Gray8 => self.pixels.clone(),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => self
                .pixels
                .chunks_exact(self.channels())
                .map(|p| luminance_u8(p[0], p[1], p[2]))
                .collect(),
        }
    }

    /// Convert to an `image::GrayImage` holding the luminance plane.
    pub fn to_luma_image(&self) -> Result<image::GrayImage, BufferError> {
        image::GrayImage::from_raw(self.width, self.height, self.luma_plane())
            .ok_or_else(|| BufferError::Resize("Failed to create GrayImage".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_channels() {
        assert_eq!(PixelFormat::Gray8.channels(), 1);
        assert_eq!(PixelFormat::Rgb8.channels(), 3);
        assert_eq!(PixelFormat::Rgba8.channels(), 4);
        assert_eq!(PixelFormat::Rgba8.color_channels(), 3);
        assert!(PixelFormat::Rgba8.has_alpha());
        assert!(!PixelFormat::Rgb8.has_alpha());
    }

    #[test]
    fn test_format_from_channels() {
        assert_eq!(PixelFormat::from_channels(1), Ok(PixelFormat::Gray8));
        assert_eq!(PixelFormat::from_channels(4), Ok(PixelFormat::Rgba8));
        assert_eq!(
            PixelFormat::from_channels(2),
            Err(BufferError::UnsupportedChannels(2))
        );
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = PixelBuffer::new(100, 50, PixelFormat::Rgb8, vec![0u8; 100 * 50 * 3]).unwrap();

        assert_eq!(buffer.width, 100);
        assert_eq!(buffer.height, 50);
        assert_eq!(buffer.pixel_count(), 5000);
        assert_eq!(buffer.pixels.len(), 15000);
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let err = PixelBuffer::new(10, 10, PixelFormat::Rgba8, vec![0u8; 300]).unwrap_err();
        assert_eq!(
            err,
            BufferError::SizeMismatch {
                expected: 400,
                actual: 300
            }
        );
    }

    #[test]
    fn test_buffer_zero_dimensions() {
        let err = PixelBuffer::gray(0, 10, vec![]).unwrap_err();
        assert!(matches!(err, BufferError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_filled_buffer() {
        let buffer = PixelBuffer::filled(3, 2, PixelFormat::Rgba8, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.pixel(2, 1), &[1, 2, 3, 4]);
        assert!(PixelBuffer::filled(3, 2, PixelFormat::Rgb8, &[1, 2]).is_err());
    }

    #[test]
    fn test_luma_plane() {
        let buffer = PixelBuffer::new(2, 1, PixelFormat::Rgb8, vec![255, 255, 255, 0, 0, 0]).unwrap();
        assert_eq!(buffer.luma_plane(), vec![255, 0]);

        let gray = PixelBuffer::gray(2, 1, vec![7, 9]).unwrap();
        assert_eq!(gray.luma_plane(), vec![7, 9]);
    }

    #[test]
    fn test_luma_image_dimensions() {
        let buffer = PixelBuffer::filled(8, 4, PixelFormat::Rgba8, &[10, 20, 30, 255]).unwrap();
        let img = buffer.to_luma_image().unwrap();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.as_raw().len(), buffer.pixel_count());
    }

    #[test]
    fn test_buffer_error_display() {
        let err = BufferError::InvalidDimensions {
            width: 0,
            height: 5,
        };
        assert_eq!(err.to_string(), "Invalid buffer dimensions: 0x5");
    }
}
