//! Position weighting for edge samples.
//!
//! Vertical edges near the left and right borders are usually architecture
//! (wall corners, door frames) rather than furniture or pattern, so samples
//! in those bands vote with more weight.

use serde::{Deserialize, Serialize};

use super::DetectionConfig;

/// Region of the image a sample falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    /// Left or right border band.
    Side,
    /// Top or bottom border band.
    TopBottom,
    Interior,
}

impl Band {
    pub fn is_border(self) -> bool {
        !matches!(self, Band::Interior)
    }
}

/// Weight multipliers by band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionWeights {
    pub border_fraction: f64,
    pub side: f64,
    pub top_bottom: f64,
    pub interior: f64,
}

impl Default for PositionWeights {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl PositionWeights {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            border_fraction: config.border_fraction.clamp(0.0, 0.5),
            side: config.side_weight,
            top_bottom: config.top_bottom_weight,
            interior: config.interior_weight,
        }
    }

    /// Band for a position. Side bands win in the corners.
    pub fn band(&self, x: u32, y: u32, width: u32, height: u32) -> Band {
        let in_band = |v: u32, extent: u32| {
            let v = v as f64;
            let band = self.border_fraction * extent as f64;
            v < band || v >= extent as f64 - band
        };
        if in_band(x, width) {
            Band::Side
        } else if in_band(y, height) {
            Band::TopBottom
        } else {
            Band::Interior
        }
    }

    pub fn weight_for(&self, band: Band) -> f64 {
        match band {
            Band::Side => self.side,
            Band::TopBottom => self.top_bottom,
            Band::Interior => self.interior,
        }
    }
}
