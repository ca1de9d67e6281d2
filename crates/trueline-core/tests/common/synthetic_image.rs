use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trueline_core::PixelBuffer;

const BACKGROUND: f64 = 200.0;
const INK: f64 = 40.0;

/// A straight dark bar in content space, before the scene is tilted.
#[derive(Debug, Clone, Copy)]
pub enum Bar {
    /// Vertical bar centred `offset` pixels right of the image centre.
    Vertical { offset: f64, half_width: f64 },
    /// Horizontal bar centred `offset` pixels below the image centre.
    Horizontal { offset: f64, half_width: f64 },
}

/// Renders dark bars on a light background, rotated counter-clockwise by
/// `tilt_degrees` about the image centre, with ±`noise` uniform grain.
///
/// Bar edges are anti-aliased over one pixel so the tilt survives
/// sampling without stair-step bias.
pub fn tilted_bars(
    width: u32,
    height: u32,
    tilt_degrees: f64,
    bars: &[Bar],
    noise: i32,
    seed: u64,
) -> PixelBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let (sin, cos) = tilt_degrees.to_radians().sin_cos();
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            // Undo the tilt to find the content coordinate of this pixel.
            let u = cos * dx - sin * dy;
            let v = sin * dx + cos * dy;

            let coverage = bars
                .iter()
                .map(|bar| {
                    let (distance, half_width) = match *bar {
                        Bar::Vertical { offset, half_width } => ((u - offset).abs(), half_width),
                        Bar::Horizontal { offset, half_width } => ((v - offset).abs(), half_width),
                    };
                    (half_width + 0.5 - distance).clamp(0.0, 1.0)
                })
                .fold(0.0, f64::max);

            let value = BACKGROUND + (INK - BACKGROUND) * coverage;
            let grain = if noise > 0 {
                rng.random_range(-noise..=noise)
            } else {
                0
            };
            pixels.push((value.round() as i32 + grain).clamp(0, 255) as u8);
        }
    }
    PixelBuffer::gray(width, height, pixels).expect("synthetic buffer has the right length")
}

/// Grain of [`framed_scene`], strong enough that a large share of the
/// background clears the default edge threshold.
pub const FRAME_GRAIN: i32 = 20;

/// Two long vertical bars at 10% and 90% of the width, with
/// ±[`FRAME_GRAIN`] grain.
pub fn framed_scene(width: u32, height: u32, tilt_degrees: f64, seed: u64) -> PixelBuffer {
    let offset = width as f64 * 0.4;
    let bars = [
        Bar::Vertical {
            offset: -offset,
            half_width: 4.0,
        },
        Bar::Vertical {
            offset,
            half_width: 4.0,
        },
    ];
    tilted_bars(width, height, tilt_degrees, &bars, FRAME_GRAIN, seed)
}

/// A regular grid of thin bars covering the whole frame.
pub fn grid_scene(width: u32, height: u32, spacing: f64, tilt_degrees: f64, seed: u64) -> PixelBuffer {
    let reach = width.max(height) as f64;
    let count = (reach / spacing).ceil() as i32;
    let mut bars = Vec::new();
    for i in -count..=count {
        let offset = i as f64 * spacing + spacing / 2.0;
        bars.push(Bar::Vertical {
            offset,
            half_width: 2.0,
        });
        bars.push(Bar::Horizontal {
            offset,
            half_width: 2.0,
        });
    }
    tilted_bars(width, height, tilt_degrees, &bars, 3, seed)
}

/// Full-range uniform noise with no structure at all.
pub fn noise_u8(width: u32, height: u32, seed: u64) -> PixelBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let pixels = (0..width as usize * height as usize)
        .map(|_| rng.random::<u8>())
        .collect();
    PixelBuffer::gray(width, height, pixels).expect("synthetic buffer has the right length")
}
