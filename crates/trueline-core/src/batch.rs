//! Batch straightening.
//!
//! Runs detection over an ordered list of images on a bounded worker pool,
//! optionally levels each one and applies an extra transform, and returns
//! one [`BatchItem`] per input in input order.
//!
//! Cancellation is per image: once the flag is set no further image starts,
//! while images already in flight finish normally.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::{resize_to_fit, PixelBuffer};
use crate::compute::Executor;
use crate::straighten::{straighten_report, DetectError, DetectionConfig};
use crate::transform::{RotateParams, TransformParams};

/// Batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    pub detection: DetectionConfig,
    /// Minimum confidence for `needs_correction`.
    pub min_confidence: f64,
    /// Minimum absolute angle in degrees for `needs_correction`.
    pub min_angle: f64,
    /// Rotate the corrected preview when correction is needed.
    pub apply_correction: bool,
    /// Long edge of the previews in pixels.
    pub preview_max_edge: u32,
    /// Extra transform applied to the corrected preview after levelling.
    pub transform: Option<TransformParams>,
    /// Worker bound; 0 uses every available CPU.
    pub max_parallel: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            min_confidence: 0.3,
            min_angle: 0.3,
            apply_correction: true,
            preview_max_edge: 512,
            transform: None,
            max_parallel: 0,
        }
    }
}

impl BatchOptions {
    /// Check the detection settings and the batch thresholds.
    pub fn validate(&self) -> Result<(), DetectError> {
        self.detection.validate()?;
        let invalid = |field, reason| Err(DetectError::InvalidConfig { field, reason });
        if !self.min_confidence.is_finite() {
            return invalid("min_confidence", "must be finite");
        }
        if !self.min_angle.is_finite() {
            return invalid("min_angle", "must be finite");
        }
        if self.preview_max_edge == 0 {
            return invalid("preview_max_edge", "must be positive");
        }
        Ok(())
    }

    /// Whether a detection result should be acted on.
    pub fn needs_correction(&self, angle_degrees: f64, confidence: f64) -> bool {
        confidence >= self.min_confidence && angle_degrees.abs() >= self.min_angle
    }
}

/// Outcome of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processed,
    /// Below the detection minimum size; previews are still produced.
    TooSmall,
    Failed(String),
    /// Not started because the batch was cancelled.
    Cancelled,
}

/// Per-image batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Position in the input list.
    pub index: usize,
    pub status: BatchStatus,
    pub angle_degrees: f64,
    pub confidence: f64,
    pub needs_correction: bool,
    pub before_preview: Option<PixelBuffer>,
    pub corrected_preview: Option<PixelBuffer>,
}

impl BatchItem {
    fn empty(index: usize, status: BatchStatus) -> Self {
        Self {
            index,
            status,
            angle_degrees: 0.0,
            confidence: 0.0,
            needs_correction: false,
            before_preview: None,
            corrected_preview: None,
        }
    }
}

/// Process a batch with the process-wide executor and no cancellation.
pub fn batch_process(images: &[PixelBuffer], options: &BatchOptions) -> Vec<BatchItem> {
    batch_process_with(Executor::global(), images, options, &AtomicBool::new(false))
}

/// Process a batch with an explicit executor and cancellation flag.
///
/// # Arguments
///
/// * `executor` - Dispatches the correction and extra transform
/// * `images` - Inputs, left untouched
/// * `options` - Detection thresholds, preview size and worker bound
/// * `cancel` - Checked before each image starts
///
/// Invalid options fail every item without starting any work.
pub fn batch_process_with(
    executor: &Executor,
    images: &[PixelBuffer],
    options: &BatchOptions,
    cancel: &AtomicBool,
) -> Vec<BatchItem> {
    if let Err(e) = options.validate() {
        warn!(error = %e, images = images.len(), "batch rejected");
        let message = e.to_string();
        return (0..images.len())
            .map(|index| BatchItem::empty(index, BatchStatus::Failed(message.clone())))
            .collect();
    }

    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    let workers = match options.max_parallel {
        0 => cpus,
        n => n.min(cpus),
    };
    info!(images = images.len(), workers, "batch started");

    let run = |(index, image): (usize, &PixelBuffer)| {
        if cancel.load(Ordering::Acquire) {
            return BatchItem::empty(index, BatchStatus::Cancelled);
        }
        process_one(executor, index, image, options)
    };

    let items: Vec<BatchItem> = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("trueline-batch-{i}"))
        .build()
    {
        Ok(pool) => pool.install(|| images.par_iter().enumerate().map(run).collect()),
        Err(e) => {
            warn!(error = %e, "batch pool unavailable, processing sequentially");
            images.iter().enumerate().map(run).collect()
        }
    };

    let processed = items
        .iter()
        .filter(|item| item.status == BatchStatus::Processed)
        .count();
    let flagged = items.iter().filter(|item| item.needs_correction).count();
    let cancelled = items
        .iter()
        .filter(|item| item.status == BatchStatus::Cancelled)
        .count();
    if cancelled > 0 {
        info!(cancelled, "batch cancelled before all images started");
    }
    info!(
        images = items.len(),
        processed,
        needs_correction = flagged,
        "batch finished"
    );
    items
}

fn process_one(
    executor: &Executor,
    index: usize,
    image: &PixelBuffer,
    options: &BatchOptions,
) -> BatchItem {
    let report = match straighten_report(image, &options.detection) {
        Ok(report) => Some(report),
        Err(DetectError::TooSmall { .. }) => None,
        Err(e) => return BatchItem::empty(index, BatchStatus::Failed(e.to_string())),
    };

    let before = match resize_to_fit(image, options.preview_max_edge) {
        Ok(preview) => preview,
        Err(e) => return BatchItem::empty(index, BatchStatus::Failed(e.to_string())),
    };

    let Some(report) = report else {
        debug!(index, "image too small, skipping detection");
        return BatchItem {
            before_preview: Some(before),
            ..BatchItem::empty(index, BatchStatus::TooSmall)
        };
    };

    let decision = report.decision;
    let needs_correction = options.needs_correction(decision.angle_degrees, decision.confidence);

    let mut corrected = before.clone();
    if options.apply_correction && needs_correction {
        let rotate = TransformParams::Rotate(RotateParams::new(decision.angle_degrees));
        match executor.apply(&corrected, &rotate) {
            Ok(out) => corrected = out,
            Err(e) => {
                return BatchItem {
                    angle_degrees: decision.angle_degrees,
                    confidence: decision.confidence,
                    needs_correction,
                    before_preview: Some(before),
                    ..BatchItem::empty(index, BatchStatus::Failed(e.to_string()))
                }
            }
        }
    }
    if let Some(transform) = &options.transform {
        match executor.apply(&corrected, transform) {
            Ok(out) => corrected = out,
            Err(e) => {
                return BatchItem {
                    angle_degrees: decision.angle_degrees,
                    confidence: decision.confidence,
                    needs_correction,
                    before_preview: Some(before),
                    ..BatchItem::empty(index, BatchStatus::Failed(e.to_string()))
                }
            }
        }
    }

    debug!(
        index,
        angle = decision.angle_degrees,
        confidence = decision.confidence,
        needs_correction,
        "batch image processed"
    );

    BatchItem {
        index,
        status: BatchStatus::Processed,
        angle_degrees: decision.angle_degrees,
        confidence: decision.confidence,
        needs_correction,
        before_preview: Some(before),
        corrected_preview: Some(corrected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;
    use crate::transform::ToneParams;

    fn blank(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::filled(width, height, PixelFormat::Rgb8, &[120, 120, 120]).unwrap()
    }

    #[test]
    fn test_needs_correction_thresholds_inclusive() {
        let options = BatchOptions::default();
        assert!(options.needs_correction(0.3, 0.3));
        assert!(options.needs_correction(-1.0, 0.5));
        assert!(!options.needs_correction(0.29, 0.9));
        assert!(!options.needs_correction(2.0, 0.29));
    }

    #[test]
    fn test_statuses_and_order() {
        let images = vec![
            blank(200, 100),
            blank(20, 20),
            PixelBuffer {
                width: 10,
                height: 10,
                format: PixelFormat::Gray8,
                pixels: vec![0; 3],
            },
            blank(100, 200),
        ];
        let items = batch_process_with(
            &Executor::scalar_only(),
            &images,
            &BatchOptions::default(),
            &AtomicBool::new(false),
        );
        assert_eq!(items.len(), 4);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.index, i);
        }
        assert_eq!(items[0].status, BatchStatus::Processed);
        assert_eq!(items[1].status, BatchStatus::TooSmall);
        assert!(items[1].before_preview.is_some());
        assert!(items[1].corrected_preview.is_none());
        assert!(matches!(items[2].status, BatchStatus::Failed(_)));
        assert_eq!(items[3].status, BatchStatus::Processed);
        assert!(!items[0].needs_correction);
        assert_eq!(items[0].corrected_preview, items[0].before_preview);
    }

    #[test]
    fn test_previews_bounded() {
        let options = BatchOptions {
            preview_max_edge: 64,
            ..Default::default()
        };
        let items = batch_process_with(
            &Executor::scalar_only(),
            &[blank(300, 150)],
            &options,
            &AtomicBool::new(false),
        );
        let preview = items[0].before_preview.as_ref().unwrap();
        assert_eq!((preview.width, preview.height), (64, 32));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = AtomicBool::new(true);
        let items = batch_process_with(
            &Executor::scalar_only(),
            &[blank(100, 100), blank(100, 100)],
            &BatchOptions::default(),
            &cancel,
        );
        assert!(items.iter().all(|item| item.status == BatchStatus::Cancelled));
        assert_eq!(items[1].index, 1);
    }

    #[test]
    fn test_extra_transform_applied() {
        let options = BatchOptions {
            transform: Some(TransformParams::Tone(ToneParams {
                exposure: 1.0,
                ..Default::default()
            })),
            max_parallel: 1,
            ..Default::default()
        };
        let items = batch_process_with(
            &Executor::scalar_only(),
            &[blank(100, 100)],
            &options,
            &AtomicBool::new(false),
        );
        let corrected = items[0].corrected_preview.as_ref().unwrap();
        assert_eq!(corrected.pixels[0], 240);
    }

    #[test]
    fn test_invalid_transform_fails_item() {
        let options = BatchOptions {
            transform: Some(TransformParams::Tone(ToneParams {
                exposure: 50.0,
                ..Default::default()
            })),
            ..Default::default()
        };
        let items = batch_process_with(
            &Executor::scalar_only(),
            &[blank(100, 100)],
            &options,
            &AtomicBool::new(false),
        );
        assert!(matches!(items[0].status, BatchStatus::Failed(_)));
        assert!(items[0].before_preview.is_some());
    }

    #[test]
    fn test_invalid_options_fail_every_item() {
        let cases = [
            BatchOptions {
                detection: DetectionConfig {
                    search_window: f64::NAN,
                    ..Default::default()
                },
                ..Default::default()
            },
            BatchOptions {
                detection: DetectionConfig {
                    working_max_edge: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            BatchOptions {
                min_confidence: f64::NAN,
                ..Default::default()
            },
            BatchOptions {
                preview_max_edge: 0,
                ..Default::default()
            },
        ];
        for options in cases {
            assert!(options.validate().is_err());
            let items = batch_process_with(
                &Executor::scalar_only(),
                &[blank(100, 100), blank(120, 80)],
                &options,
                &AtomicBool::new(false),
            );
            assert_eq!(items.len(), 2);
            for (i, item) in items.iter().enumerate() {
                assert_eq!(item.index, i);
                assert!(matches!(&item.status, BatchStatus::Failed(msg) if msg.contains("Invalid setting")));
                assert!(item.before_preview.is_none());
            }
        }
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: BatchOptions = serde_json::from_str(r#"{"min_angle": 1.0}"#).unwrap();
        assert_eq!(options.min_angle, 1.0);
        assert_eq!(options.min_confidence, 0.3);
        assert!(options.apply_correction);
    }
}
