//! Pixel buffers handed between the host application and this core.
//!
//! Decoding and encoding stay with the host; everything here starts from an
//! already-decoded buffer in one of three 8-bit layouts:
//! - `Gray8` single-channel intensity
//! - `Rgb8` three-channel color
//! - `Rgba8` four-channel color with straight alpha

mod resize;
mod types;

pub use resize::{resize_to_fit, working_preview};
pub use types::{BufferError, PixelBuffer, PixelFormat};
