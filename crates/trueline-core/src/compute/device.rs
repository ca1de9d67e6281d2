//! Accelerated execution device.
//!
//! A `Device` owns a dedicated rayon thread pool plus a memory budget for the
//! texel grids it allocates. Each transform opens one [`Dispatch`], which
//! charges every upload, reduction and launch it makes against that budget
//! together. Kernels are plain per-pixel closures launched across rows of
//! the output grid.
//!
//! # Failure model
//!
//! Any of these surfaces as a [`DeviceError`] instead of a panic, so the
//! executor can fall back to the scalar routines:
//! - the pool cannot be built (no thread support on the target)
//! - a dispatch's allocations would together exceed the configured budget
//! - a kernel panics mid-launch

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::packed::{PackedImage, Texel};
use crate::buffer::PixelBuffer;

/// Errors raised by the accelerated path. Never surfaced to callers of
/// `apply_transform`; the executor downgrades and recovers instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not be brought up.
    #[error("Accelerated device unavailable: {0}")]
    Unavailable(String),

    /// A dispatch's allocations would together exceed the memory budget.
    #[error("Device out of memory: dispatch needs {requested} bytes, budget {budget} bytes")]
    OutOfMemory { requested: u64, budget: u64 },

    /// A kernel panicked while running.
    #[error("Kernel panicked: {0}")]
    KernelPanicked(String),

    /// The worker pool failed to build.
    #[error("Failed to build device pool: {0}")]
    PoolBuild(String),
}

/// Settings for bringing up the accelerated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Worker threads; 0 lets rayon pick the CPU count.
    pub threads: usize,
    /// Upper bound on bytes a single dispatch may allocate in total.
    pub memory_budget_bytes: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            memory_budget_bytes: 1 << 30,
        }
    }
}

/// A live accelerated device.
#[derive(Debug)]
pub struct Device {
    pool: rayon::ThreadPool,
    memory_budget: u64,
}

impl Device {
    /// Bring up a device with the given configuration.
    pub fn probe(config: &DeviceConfig) -> Result<Self, DeviceError> {
        if config.memory_budget_bytes == 0 {
            return Err(DeviceError::Unavailable(
                "memory budget is zero".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("trueline-device-{i}"))
            .build()
            .map_err(|e| DeviceError::PoolBuild(e.to_string()))?;
        Ok(Self {
            pool,
            memory_budget: config.memory_budget_bytes,
        })
    }

    /// Number of worker threads in the device pool.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Configured memory budget in bytes.
    pub fn memory_budget(&self) -> u64 {
        self.memory_budget
    }

    /// Open a dispatch whose allocations share one budget.
    pub fn dispatch(&self) -> Dispatch<'_> {
        Dispatch {
            device: self,
            reserved: Cell::new(0),
        }
    }

    fn guarded<F: FnOnce() + Send>(&self, f: F) -> Result<(), DeviceError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.pool.install(f)))
            .map_err(|payload| DeviceError::KernelPanicked(panic_message(payload.as_ref())))
    }
}

/// The allocations of one transform on a [`Device`].
///
/// Buffers live until the transform returns, so the budget check is against
/// the running total rather than each buffer alone.
#[derive(Debug)]
pub struct Dispatch<'d> {
    device: &'d Device,
    reserved: Cell<u64>,
}

impl Dispatch<'_> {
    /// Bytes charged so far.
    pub fn reserved(&self) -> u64 {
        self.reserved.get()
    }

    /// Charge `bytes` on top of what this dispatch already holds.
    pub fn reserve(&self, bytes: u64) -> Result<(), DeviceError> {
        let budget = self.device.memory_budget;
        let total = self.reserved.get().saturating_add(bytes);
        if total > budget {
            return Err(DeviceError::OutOfMemory {
                requested: total,
                budget,
            });
        }
        self.reserved.set(total);
        Ok(())
    }

    /// Upload a buffer-sized texel grid.
    pub fn upload(&self, image: &PixelBuffer) -> Result<PackedImage, DeviceError> {
        self.reserve(image.pixel_count() as u64 * TEXEL_BYTES)?;
        Ok(PackedImage::pack(image))
    }

    /// Run `kernel` once per output texel of a `width` x `height` grid.
    ///
    /// # Arguments
    ///
    /// * `width`, `height` - Output grid dimensions
    /// * `kernel` - Pure function of the output coordinate
    ///
    /// # Returns
    ///
    /// The filled grid, or a `DeviceError` if the dispatch total would exceed
    /// the budget or the kernel panics.
    pub fn launch<K>(&self, width: u32, height: u32, kernel: K) -> Result<PackedImage, DeviceError>
    where
        K: Fn(u32, u32) -> Texel + Sync,
    {
        self.reserve(texel_bytes(width, height))?;
        let row_len = width as usize;
        let mut texels = vec![[0.0f32; 4]; row_len * height as usize];
        if !texels.is_empty() {
            self.device.guarded(|| {
                texels
                    .par_chunks_mut(row_len)
                    .enumerate()
                    .for_each(|(y, row)| {
                        for (x, texel) in row.iter_mut().enumerate() {
                            *texel = kernel(x as u32, y as u32);
                        }
                    });
            })?;
        }
        Ok(PackedImage {
            width,
            height,
            texels,
        })
    }

    /// Run `work` for each group index and collect results in index order.
    ///
    /// Used for reduction passes (per-tile histograms) that precede a launch.
    pub fn launch_groups<T, F>(&self, groups: usize, work: F) -> Result<Vec<T>, DeviceError>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        self.reserve(groups as u64 * std::mem::size_of::<T>() as u64)?;
        let mut out = Vec::with_capacity(groups);
        self.device.guarded(|| {
            (0..groups).into_par_iter().map(&work).collect_into_vec(&mut out);
        })?;
        Ok(out)
    }
}

const TEXEL_BYTES: u64 = std::mem::size_of::<Texel>() as u64;

fn texel_bytes(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 * TEXEL_BYTES
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
