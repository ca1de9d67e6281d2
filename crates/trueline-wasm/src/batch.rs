//! WASM bindings for batch straightening.

use serde::{Deserialize, Serialize};
use trueline_core::{BatchItem, BatchOptions, BatchStatus, PixelBuffer};
use wasm_bindgen::prelude::*;

/// Image as passed from JavaScript in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BatchImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// Preview as returned to JavaScript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BatchPreview {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// One batch result as returned to JavaScript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BatchResult {
    pub index: usize,
    /// `processed`, `too_small`, `failed` or `cancelled`.
    pub status: String,
    pub error: Option<String>,
    pub angle_degrees: f64,
    pub confidence: f64,
    pub needs_correction: bool,
    pub before_preview: Option<BatchPreview>,
    pub corrected_preview: Option<BatchPreview>,
}

fn preview(buffer: PixelBuffer) -> BatchPreview {
    BatchPreview {
        width: buffer.width,
        height: buffer.height,
        channels: buffer.channels() as u8,
        pixels: buffer.pixels,
    }
}

impl From<BatchItem> for BatchResult {
    fn from(item: BatchItem) -> Self {
        let (status, error) = match item.status {
            BatchStatus::Processed => ("processed", None),
            BatchStatus::TooSmall => ("too_small", None),
            BatchStatus::Failed(reason) => ("failed", Some(reason)),
            BatchStatus::Cancelled => ("cancelled", None),
        };
        Self {
            index: item.index,
            status: status.to_string(),
            error,
            angle_degrees: item.angle_degrees,
            confidence: item.confidence,
            needs_correction: item.needs_correction,
            before_preview: item.before_preview.map(preview),
            corrected_preview: item.corrected_preview.map(preview),
        }
    }
}

/// Run detection (and optional correction) over a list of images.
///
/// # Arguments
///
/// * `images` - Array of `{ width, height, channels, pixels }`
/// * `options` - Partial batch options; missing fields use defaults
///
/// # Returns
///
/// Array of results in input order. A malformed image fails only its own
/// entry. Throws if the options are malformed or out of range.
///
/// # Example (TypeScript)
///
/// ```typescript
/// const results = batch_process(images, { min_confidence: 0.4, preview_max_edge: 256 });
/// const flagged = results.filter((r) => r.needs_correction);
/// ```
#[wasm_bindgen]
pub fn batch_process(images: JsValue, options: JsValue) -> Result<JsValue, JsValue> {
    let images: Vec<BatchImage> = serde_wasm_bindgen::from_value(images)
        .map_err(|e| JsValue::from_str(&format!("Invalid batch images: {}", e)))?;
    let options: BatchOptions = if options.is_undefined() || options.is_null() {
        BatchOptions::default()
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| JsValue::from_str(&format!("Invalid batch options: {}", e)))?
    };
    options
        .validate()
        .map_err(|e| JsValue::from_str(&format!("Invalid batch options: {}", e)))?;
    let results = run(images, &options);
    serde_wasm_bindgen::to_value(&results).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn run(images: Vec<BatchImage>, options: &BatchOptions) -> Vec<BatchResult> {
    let mut failures = Vec::new();
    let mut buffers = Vec::with_capacity(images.len());
    for (index, image) in images.into_iter().enumerate() {
        let buffer = trueline_core::PixelFormat::from_channels(image.channels).and_then(|format| {
            PixelBuffer::new(image.width, image.height, format, image.pixels)
        });
        match buffer {
            Ok(buffer) => buffers.push((index, buffer)),
            Err(e) => failures.push(BatchResult::from(BatchItem {
                index,
                status: BatchStatus::Failed(e.to_string()),
                angle_degrees: 0.0,
                confidence: 0.0,
                needs_correction: false,
                before_preview: None,
                corrected_preview: None,
            })),
        }
    }

    let (indices, valid): (Vec<usize>, Vec<PixelBuffer>) = buffers.into_iter().unzip();
    let mut results: Vec<BatchResult> = trueline_core::batch_process(&valid, options)
        .into_iter()
        .zip(indices)
        .map(|(item, index)| BatchResult {
            index,
            ..BatchResult::from(item)
        })
        .collect();
    results.extend(failures);
    results.sort_by_key(|r| r.index);
    results
}
