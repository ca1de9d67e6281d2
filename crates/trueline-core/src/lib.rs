//! Trueline Core - photo straightening and pixel transforms
//!
//! This crate detects the small rotation that levels a photograph and
//! provides the pixel transforms used to apply corrections, each with an
//! accelerated and a scalar implementation.
//!
//! - [`straighten`] - edge extraction, four angle estimators, combiner, limiter
//! - [`transform`] - undistort, smooth, local contrast, rotate, tone, watermark
//! - [`compute`] - device abstraction and the execution coordinator
//! - [`batch`] - detection and correction over many images
//!
//! Callers pass decoded [`PixelBuffer`]s; codecs and persistence live
//! elsewhere.

pub mod batch;
pub mod buffer;
pub mod compute;
pub mod luminance;
pub mod straighten;
pub mod transform;

pub use batch::{batch_process, batch_process_with, BatchItem, BatchOptions, BatchStatus};
pub use buffer::{BufferError, PixelBuffer, PixelFormat};
pub use compute::{CapabilityState, DeviceConfig, Executor};
pub use straighten::{
    detect_straighten, detect_straighten_with, straighten_report, DetectError, DetectionConfig,
    StraightenDecision, StraightenReport,
};
pub use transform::{apply_transform, TransformError, TransformParams};
