//! Random ellipse phantoms used as ground-truth images.

use ndarray::{Array2, Array4, Axis};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};
use crate::tensor::ImageBatch;

/// One filled ellipse in normalized coordinates (`[-1, 1]²`, rows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    /// Value added inside the ellipse
    pub intensity: f64,
    pub center: (f64, f64),
    /// Semi-axes along the rotated x and y directions
    pub axes: (f64, f64),
    /// Rotation in radians
    pub angle: f64,
}

impl Ellipse {
    fn contains(&self, x: f64, y: f64) -> bool {
        let (sin, cos) = self.angle.sin_cos();
        let (dx, dy) = (x - self.center.0, y - self.center.1);
        let u = (cos * dx + sin * dy) / self.axes.0;
        let v = (-sin * dx + cos * dy) / self.axes.1;
        u * u + v * v <= 1.0
    }
}

/// Parameters for [`random_phantoms`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhantomConfig {
    /// Ellipses drawn per image (inclusive range)
    pub ellipses: (usize, usize),
    /// Intensity range of each ellipse
    pub intensity: (f64, f64),
    /// Semi-axis range, as a fraction of the half image width
    pub axis: (f64, f64),
}

impl Default for PhantomConfig {
    fn default() -> Self {
        Self {
            ellipses: (3, 8),
            intensity: (0.1, 0.5),
            axis: (0.1, 0.5),
        }
    }
}

/// Rasterizes `ellipses` onto an `n × n` grid; overlapping ellipses add up.
pub fn rasterize(n: usize, ellipses: &[Ellipse]) -> Array2<f64> {
    let step = 2.0 / n as f64;
    Array2::from_shape_fn((n, n), |(r, c)| {
        let x = -1.0 + (c as f64 + 0.5) * step;
        let y = -1.0 + (r as f64 + 0.5) * step;
        ellipses
            .iter()
            .filter(|e| e.contains(x, y))
            .map(|e| e.intensity)
            .sum()
    })
}

/// Samples one random ellipse that stays inside the unit disc.
pub fn random_ellipse<R: Rng + ?Sized>(rng: &mut R, config: &PhantomConfig) -> Ellipse {
    let a = rng.gen_range(config.axis.0..=config.axis.1);
    let b = rng.gen_range(config.axis.0..=config.axis.1);
    let reach = 1.0 - a.max(b);
    let cx = rng.gen_range(-reach..=reach);
    let cy = rng.gen_range(-reach..=reach);
    Ellipse {
        intensity: rng.gen_range(config.intensity.0..=config.intensity.1),
        center: (cx, cy),
        axes: (a, b),
        angle: rng.gen_range(0.0..std::f64::consts::PI),
    }
}

/// Generates a batch of random ellipse phantoms.
///
/// # Arguments
///
/// * `batch` - Number of images
/// * `n` - Side length of each square image
/// * `seed` - Random seed for reproducibility
/// * `config` - Ellipse count, intensity and size ranges
///
/// # Returns
///
/// Real image batch of shape `(batch, 1, n, n)` with non-negative values
///
/// # Examples
///
/// ```
/// use tomo_recon_core::data::{random_phantoms, PhantomConfig};
///
/// let x = random_phantoms(2, 32, 42, &PhantomConfig::default()).unwrap();
/// assert_eq!(x.dim(), (2, 1, 32, 32));
/// ```
pub fn random_phantoms(batch: usize, n: usize, seed: u64, config: &PhantomConfig) -> ReconResult<ImageBatch> {
    validate(config)?;
    if n == 0 {
        return Err(ReconError::shape("random_phantoms", "n > 0", &[n]));
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut images = Array4::zeros((batch, 1, n, n));
    for mut item in images.axis_iter_mut(Axis(0)) {
        let count = rng.gen_range(config.ellipses.0..=config.ellipses.1);
        let ellipses: Vec<Ellipse> = (0..count).map(|_| random_ellipse(&mut rng, config)).collect();
        item.index_axis_mut(Axis(0), 0).assign(&rasterize(n, &ellipses));
    }
    Ok(images)
}

fn validate(config: &PhantomConfig) -> ReconResult<()> {
    let (lo, hi) = config.ellipses;
    if lo == 0 || lo > hi {
        return Err(ReconError::parameter("ellipses", lo as f64, "need 1 <= min <= max"));
    }
    let (lo, hi) = config.axis;
    if !(lo > 0.0 && lo <= hi && hi < 1.0) {
        return Err(ReconError::parameter("axis", lo, "semi-axes must satisfy 0 < min <= max < 1"));
    }
    let (lo, hi) = config.intensity;
    if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
        return Err(ReconError::parameter("intensity", lo, "need a finite range with min <= max"));
    }
    Ok(())
}
