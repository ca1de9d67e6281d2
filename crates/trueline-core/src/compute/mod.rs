//! Dual-path execution: an accelerated device with a scalar fallback.

mod device;
mod executor;
mod packed;

pub use device::{Device, DeviceConfig, DeviceError, Dispatch};
pub use executor::{CapabilityState, Executor};
pub use packed::{PackedImage, Texel};
