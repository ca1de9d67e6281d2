//! Execution coordinator for pixel transforms.
//!
//! The executor lazily probes for an accelerated [`Device`] on first use and
//! remembers the outcome for its lifetime. Every transform request first tries
//! the device kernel; if that fails for any reason the executor logs a
//! warning, permanently downgrades to scalar-only, and re-runs the request on
//! the scalar routine. Callers never see a device error.
//!
//! Capability moves one way: `Uninitialized` to `Accelerated` or
//! `ScalarOnly`, and `Accelerated` to `ScalarOnly`. Only [`Executor::reset`]
//! goes back, which needs exclusive access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::device::{Device, DeviceConfig, DeviceError};
use crate::buffer::PixelBuffer;
use crate::transform::{TransformError, TransformParams};

/// Which path the executor will dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityState {
    /// No request has been made yet, so the device has not been probed.
    Uninitialized,
    /// Requests run on the accelerated device.
    Accelerated,
    /// Requests run on the scalar routines.
    ScalarOnly,
}

type Probe = Box<dyn Fn() -> Result<Device, DeviceError> + Send + Sync>;

/// Dispatches transforms to the accelerated or scalar implementation.
pub struct Executor {
    probe: Probe,
    device: OnceLock<Option<Device>>,
    downgraded: AtomicBool,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}

impl Executor {
    /// Create an executor that probes a device built from `config`.
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_probe(move || Device::probe(&config))
    }

    /// Create an executor with a custom device probe.
    pub fn with_probe<F>(probe: F) -> Self
    where
        F: Fn() -> Result<Device, DeviceError> + Send + Sync + 'static,
    {
        Self {
            probe: Box::new(probe),
            device: OnceLock::new(),
            downgraded: AtomicBool::new(false),
        }
    }

    /// Create an executor that always runs the scalar routines.
    pub fn scalar_only() -> Self {
        Self::with_probe(|| {
            Err(DeviceError::Unavailable(
                "scalar execution requested".to_string(),
            ))
        })
    }

    /// Process-wide executor used by [`crate::apply_transform`].
    pub fn global() -> &'static Executor {
        static GLOBAL: OnceLock<Executor> = OnceLock::new();
        GLOBAL.get_or_init(Executor::default)
    }

    /// Current capability without triggering a probe.
    pub fn state(&self) -> CapabilityState {
        if self.downgraded.load(Ordering::Acquire) {
            return CapabilityState::ScalarOnly;
        }
        match self.device.get() {
            None => CapabilityState::Uninitialized,
            Some(Some(_)) => CapabilityState::Accelerated,
            Some(None) => CapabilityState::ScalarOnly,
        }
    }

    /// Capability after probing the device if that has not happened yet.
    pub fn capability(&self) -> CapabilityState {
        let _ = self.device();
        self.state()
    }

    /// Drop the probed device and any downgrade so the next request re-probes.
    pub fn reset(&mut self) {
        self.device = OnceLock::new();
        *self.downgraded.get_mut() = false;
    }

    fn device(&self) -> Option<&Device> {
        if self.downgraded.load(Ordering::Acquire) {
            return None;
        }
        self.device
            .get_or_init(|| match (self.probe)() {
                Ok(device) => {
                    info!(
                        threads = device.threads(),
                        budget = device.memory_budget(),
                        "accelerated device ready"
                    );
                    Some(device)
                }
                Err(err) => {
                    info!(error = %err, "accelerated device unavailable, using scalar path");
                    None
                }
            })
            .as_ref()
    }

    /// Validate and run one transform.
    ///
    /// # Arguments
    ///
    /// * `image` - Source buffer, left untouched
    /// * `params` - Which primitive to run and its settings
    ///
    /// # Returns
    ///
    /// A new buffer, or `TransformError` if the buffer or the parameters are
    /// invalid. Device failures are recovered internally.
    pub fn apply(
        &self,
        image: &PixelBuffer,
        params: &TransformParams,
    ) -> Result<PixelBuffer, TransformError> {
        image.validate()?;
        params.validate(image)?;

        if let Some(device) = self.device() {
            match params.run_kernel(device, image) {
                Ok(output) => {
                    debug!(transform = params.kind(), "accelerated path");
                    return Ok(output);
                }
                Err(err) => {
                    warn!(
                        transform = params.kind(),
                        error = %err,
                        "accelerated path failed, downgrading to scalar"
                    );
                    self.downgraded.store(true, Ordering::Release);
                }
            }
        }

        debug!(transform = params.kind(), "scalar path");
        Ok(params.run_scalar(image))
    }
}
