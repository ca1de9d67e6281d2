//! Sobel edge field extraction.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::weighting::{Band, PositionWeights};

/// Orientation class of the edge itself (perpendicular to the gradient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Vertical,
    Horizontal,
}

/// One pixel whose gradient magnitude cleared the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSample {
    pub x: u32,
    pub y: u32,
    pub magnitude: f64,
    /// Gradient direction in degrees, [0, 360), y axis pointing down.
    pub angle: f64,
    /// Position weight.
    pub weight: f64,
    pub band: Band,
}

impl EdgeSample {
    /// Signed offset in degrees from the nearest axis, in [-45, 45).
    ///
    /// For an edge tilted from vertical or horizontal this equals the
    /// rotation that would level it (positive = counter-clockwise).
    pub fn deviation(&self) -> f64 {
        (self.angle + 45.0).rem_euclid(90.0) - 45.0
    }

    pub fn axis(&self) -> Axis {
        let a = self.angle.rem_euclid(180.0);
        if !(45.0..135.0).contains(&a) {
            Axis::Vertical
        } else {
            Axis::Horizontal
        }
    }

    /// Magnitude times position weight.
    pub fn vote(&self) -> f64 {
        self.magnitude * self.weight
    }
}

/// All edge samples of a working preview, in raster order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeField {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<EdgeSample>,
}

impl EdgeField {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Extract Sobel edge samples above `threshold` from a grayscale preview.
///
/// Border pixels are skipped. Rows run in parallel and are concatenated in
/// row order, so the result does not depend on scheduling.
pub fn extract_edges(preview: &GrayImage, threshold: f64, weights: &PositionWeights) -> EdgeField {
    let (width, height) = preview.dimensions();
    let mut field = EdgeField {
        width,
        height,
        samples: Vec::new(),
    };
    if width < 3 || height < 3 {
        return field;
    }

    let data = preview.as_raw();
    let stride = width as usize;
    let at = |x: u32, y: u32| data[y as usize * stride + x as usize] as f64;

    let rows: Vec<Vec<EdgeSample>> = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            let mut row = Vec::new();
            for x in 1..width - 1 {
                let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
                let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude <= threshold {
                    continue;
                }
                let band = weights.band(x, y, width, height);
                row.push(EdgeSample {
                    x,
                    y,
                    magnitude,
                    angle: gy.atan2(gx).to_degrees().rem_euclid(360.0),
                    weight: weights.weight_for(band),
                    band,
                });
            }
            row
        })
        .collect();

    field.samples = rows.into_iter().flatten().collect();
    field
}
