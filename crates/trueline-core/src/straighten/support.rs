//! Line support filtering.
//!
//! A sample on a real straight edge has neighbours with the same orientation
//! along its tangent on both sides. Sensor grain and fine texture also clear
//! the magnitude threshold, but their gradients point every which way, so
//! walking a few pixels along the tangent almost never finds a matching
//! neighbour at every step. Only samples that do survive.

use rayon::prelude::*;

use super::edges::{EdgeField, EdgeSample};
use super::tunables::{SUPPORT_MIN_SAMPLES, SUPPORT_NORMAL_OFFSETS, SUPPORT_STEP};

const EMPTY: u32 = u32::MAX;

/// Settings for [`filter_supported`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSupport {
    /// Pixels walked along the tangent on each side. Zero keeps every sample.
    pub reach: u32,
    /// Largest orientation difference to a supporter, in degrees.
    pub tolerance: f64,
}

/// Orientation difference of two gradient angles, ignoring polarity.
fn orientation_diff(a: f64, b: f64) -> f64 {
    ((a - b + 90.0).rem_euclid(180.0) - 90.0).abs()
}

struct Index<'a> {
    field: &'a EdgeField,
    cells: Vec<u32>,
}

impl<'a> Index<'a> {
    fn new(field: &'a EdgeField) -> Self {
        let mut cells = vec![EMPTY; field.width as usize * field.height as usize];
        for (i, s) in field.samples.iter().enumerate() {
            cells[s.y as usize * field.width as usize + s.x as usize] = i as u32;
        }
        Self { field, cells }
    }

    fn at(&self, x: f64, y: f64) -> Option<&EdgeSample> {
        let (x, y) = (x.round(), y.round());
        if x < 0.0 || y < 0.0 || x >= self.field.width as f64 || y >= self.field.height as f64 {
            return None;
        }
        let idx = self.cells[y as usize * self.field.width as usize + x as usize];
        (idx != EMPTY).then(|| &self.field.samples[idx as usize])
    }

    fn supported(&self, sample: &EdgeSample, support: &LineSupport) -> bool {
        let (sin, cos) = sample.angle.to_radians().sin_cos();
        // Tangent is the gradient turned a quarter, normal is the gradient.
        let (tx, ty) = (-sin, cos);
        let (x, y) = (sample.x as f64, sample.y as f64);
        let step = SUPPORT_STEP.max(1) as usize;

        (step as u32..=support.reach).step_by(step).all(|k| {
            [-1.0, 1.0].iter().all(|&side| {
                let d = side * k as f64;
                SUPPORT_NORMAL_OFFSETS.iter().any(|&j| {
                    self.at(x + d * tx + j * cos, y + d * ty + j * sin)
                        .is_some_and(|n| orientation_diff(n.angle, sample.angle) <= support.tolerance)
                })
            })
        })
    }
}

/// Keep the samples that lie on a coherent line.
///
/// Order is preserved. If fewer than [`SUPPORT_MIN_SAMPLES`] survive the
/// result is empty, so pure texture reads as "no evidence" rather than as a
/// handful of random votes.
pub fn filter_supported(field: &EdgeField, support: &LineSupport) -> EdgeField {
    if support.reach == 0 {
        return field.clone();
    }
    let index = Index::new(field);
    let samples: Vec<EdgeSample> = field
        .samples
        .par_iter()
        .filter(|s| index.supported(s, support))
        .copied()
        .collect();

    EdgeField {
        width: field.width,
        height: field.height,
        samples: if samples.len() < SUPPORT_MIN_SAMPLES {
            Vec::new()
        } else {
            samples
        },
    }
}
