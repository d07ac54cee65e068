//! Golden-angle radial sampling masks for subsampled Fourier operators.

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};

/// Radial spokes through the center of the frequency grid, with angles spaced
/// by the golden angle (about 111.25°). The first spoke of offset 0 is
/// horizontal; `offset` skips the first `offset * num_lines` spokes.
///
/// Serializes as its parameters; deserializing regenerates the mask.
///
/// # Examples
///
/// ```
/// use tomo_recon_core::mask::RadialMask;
///
/// let mask = RadialMask::new((64, 64), 40, 0).unwrap();
/// assert!(mask.mask()[[32, 32]]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RadialMaskParams", into = "RadialMaskParams")]
pub struct RadialMask {
    shape: (usize, usize),
    num_lines: usize,
    offset: usize,
    mask: Array2<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RadialMaskParams {
    shape: (usize, usize),
    num_lines: usize,
    #[serde(default)]
    offset: usize,
}

impl TryFrom<RadialMaskParams> for RadialMask {
    type Error = ReconError;

    fn try_from(params: RadialMaskParams) -> ReconResult<Self> {
        RadialMask::new(params.shape, params.num_lines, params.offset)
    }
}

impl From<RadialMask> for RadialMaskParams {
    fn from(mask: RadialMask) -> Self {
        Self {
            shape: mask.shape,
            num_lines: mask.num_lines,
            offset: mask.offset,
        }
    }
}

impl RadialMask {
    pub fn new(shape: (usize, usize), num_lines: usize, offset: usize) -> ReconResult<Self> {
        if shape.0 == 0 || shape.1 == 0 {
            return Err(ReconError::shape("RadialMask::new", "non-empty (H, W)", &[shape.0, shape.1]));
        }
        if num_lines == 0 {
            return Err(ReconError::parameter("num_lines", 0.0, "at least one spoke is required"));
        }
        Ok(Self {
            shape,
            num_lines,
            offset,
            mask: generate(shape, num_lines, offset),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn num_lines(&self) -> usize {
        self.num_lines
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Spoke angles in degrees.
    pub fn angles(&self) -> Vec<f64> {
        spoke_angles(self.num_lines, self.offset)
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn into_mask(self) -> Array2<bool> {
        self.mask
    }

    /// Fraction of sampled frequencies.
    pub fn sampling_rate(&self) -> f64 {
        self.mask.iter().filter(|&&m| m).count() as f64 / self.mask.len() as f64
    }
}

fn spoke_angles(num_lines: usize, offset: usize) -> Vec<f64> {
    let golden = (5f64.sqrt() - 1.0) / 2.0;
    (offset * num_lines..(offset + 1) * num_lines)
        .map(|k| 180.0 * golden * k as f64)
        .collect()
}

/// Draws each spoke as a horizontal line through the center of a `d × d`
/// template (`d = ⌈√2·max(H, W)⌉`) rotated with nearest-neighbour lookup,
/// then crops the template to `shape`.
fn generate(shape: (usize, usize), num_lines: usize, offset: usize) -> Array2<bool> {
    let (rows, cols) = shape;
    let d = (std::f64::consts::SQRT_2 * rows.max(cols) as f64).ceil() as usize;
    let line_row = (d / 2) as f64;
    let center = (d as f64 - 1.0) / 2.0;
    let mut template = Array2::from_elem((d, d), false);

    for angle in spoke_angles(num_lines, offset) {
        let (sin, cos) = angle.to_radians().sin_cos();
        for ((r, c), hit) in template.indexed_iter_mut() {
            if *hit {
                continue;
            }
            // source of output pixel (r, c) under a rotation about the center
            let (x, y) = (c as f64 - center, r as f64 - center);
            let src_col = (cos * x - sin * y + center).round();
            let src_row = (sin * x + cos * y + center).round();
            if src_row == line_row && src_col >= 0.0 && src_col < d as f64 {
                *hit = true;
            }
        }
    }

    let top = d / 2 - rows / 2;
    let left = d / 2 - cols / 2;
    template
        .slice(s![top..top + rows, left..left + cols])
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializing_regenerates_the_mask() {
        let mask = RadialMask::new((24, 24), 6, 1).unwrap();
        let json = serde_json::to_string(&mask).unwrap();
        assert!(!json.contains("true"));
        let restored: RadialMask = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, mask);
        assert_eq!(restored.mask().dim(), (24, 24));

        let rebuilt: RadialMask = serde_json::from_str(r#"{"shape": [16, 16], "num_lines": 4}"#).unwrap();
        assert_eq!(rebuilt, RadialMask::new((16, 16), 4, 0).unwrap());
        assert!(serde_json::from_str::<RadialMask>(r#"{"shape": [16, 16], "num_lines": 0}"#).is_err());
    }

    #[test]
    fn first_spoke_is_horizontal() {
        let mask = RadialMask::new((64, 64), 1, 0).unwrap();
        let m = mask.mask();
        assert_eq!(m.dim(), (64, 64));
        assert!(m.row(32).iter().all(|&v| v));
        assert_eq!(m.iter().filter(|&&v| v).count(), 64);
    }

    #[test]
    fn forty_spokes_cover_center_and_undersample() {
        let mask = RadialMask::new((64, 64), 40, 0).unwrap();
        assert!(mask.mask()[[32, 32]]);
        let rate = mask.sampling_rate();
        assert!(rate > 0.2 && rate < 0.8, "sampling rate {rate}");
    }

    #[test]
    fn more_spokes_sample_more() {
        let few = RadialMask::new((32, 32), 5, 0).unwrap();
        let many = RadialMask::new((32, 32), 20, 0).unwrap();
        assert!(many.sampling_rate() > few.sampling_rate());
    }

    #[test]
    fn offset_shifts_angle_sequence() {
        let base = RadialMask::new((16, 16), 4, 0).unwrap();
        let shifted = RadialMask::new((16, 16), 4, 1).unwrap();
        assert_eq!(base.angles().len(), 4);
        assert!((shifted.angles()[0] - base.angles()[3] - 180.0 * (5f64.sqrt() - 1.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn odd_shapes_are_cropped_exactly() {
        let mask = RadialMask::new((15, 20), 8, 0).unwrap();
        assert_eq!(mask.mask().dim(), (15, 20));
        assert!(RadialMask::new((0, 4), 3, 0).is_err());
        assert!(RadialMask::new((4, 4), 0, 0).is_err());
    }
}
