//! Trueline WASM - WebAssembly bindings for Trueline
//!
//! This crate exposes trueline-core straightening detection, pixel transforms
//! and batch processing to JavaScript/TypeScript applications.
//!
//! # Module Structure
//!
//! - `types` - WASM-compatible wrapper for pixel buffers
//! - `straighten` - Straightening detection
//! - `transform` - The six pixel transforms
//! - `batch` - Batch detection and correction
//!
//! # Usage
//!
//! ```typescript
//! import init, { JsPixelBuffer, detect_straighten, apply_transform } from '@trueline/wasm';
//!
//! await init();
//!
//! const image = new JsPixelBuffer(width, height, 4, rgbaBytes);
//! const { angle_degrees, confidence } = detect_straighten(image);
//! const levelled = apply_transform(image, { rotate: { angle_degrees } });
//! ```
//!
//! In a browser without shared-memory threads, detection and transforms fall
//! back to running on the calling thread.

use wasm_bindgen::prelude::*;

mod batch;
mod straighten;
mod transform;
mod types;

pub use batch::batch_process;
pub use straighten::{detect_straighten, JsStraightenResult};
pub use transform::apply_transform;
pub use types::JsPixelBuffer;

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
