//! Parallel-beam projection (Radon) operator and filtered back-projection.
//!
//! Rays are traced through the image with unit sample spacing and bilinear
//! interpolation. Forward projection and its transpose share one tracer, so
//! `adj` is the exact transpose of `dot`.
//!
//! Geometry for an `n × n` image with `d = ⌈√2·n⌉` detector bins, centered at
//! `c = (n - 1) / 2`: bin `k` at angle `θ` is the line
//! `{ s·(cosθ, sinθ) + t·(-sinθ, cosθ) }` with `s = k - (d - 1) / 2`, sampled
//! at `t = l - (d - 1) / 2` for `l` in `0..d`. Points are `(x, y) = (j - c, i - c)`.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayView4, ArrayViewMut1, ArrayViewMut2, Zip};
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::LinearOperator;
use crate::error::{ReconError, ReconResult};
use crate::tensor::{check_image, check_measurement, ImageBatch, MeasBatch};

/// Frequency window applied to the ramp filter in filtered back-projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FbpFilter {
    /// Plain Ram-Lak ramp.
    Ramp,
    /// Ramp apodized by a Hann window.
    #[default]
    Hann,
}

/// `count` angles evenly covering `[0, π)`.
pub fn uniform_angles(count: usize) -> Vec<f64> {
    (0..count).map(|k| k as f64 * PI / count as f64).collect()
}

#[derive(Clone)]
pub struct Radon {
    size: usize,
    bins: usize,
    angles: Vec<f64>,
    directions: Vec<(f64, f64)>,
    codomain: usize,
    /// Continuous-adjoint normalization `π / (2·angles)` of back-projection.
    adj_factor: f64,
    filter: FbpFilter,
    response: Array1<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Radon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Radon")
            .field("size", &self.size)
            .field("bins", &self.bins)
            .field("angles", &self.angles.len())
            .field("filter", &self.filter)
            .finish()
    }
}

impl Radon {
    /// Projection operator on an `n × n` domain at the given angles (radians),
    /// inverting with the Hann-apodized ramp filter.
    pub fn new(domain: (usize, usize), angles: Vec<f64>) -> ReconResult<Self> {
        Self::with_filter(domain, angles, FbpFilter::default())
    }

    pub fn with_filter(domain: (usize, usize), angles: Vec<f64>, filter: FbpFilter) -> ReconResult<Self> {
        let (rows, cols) = domain;
        if rows != cols {
            return Err(ReconError::NonSquareDomain { rows, cols });
        }
        if rows == 0 {
            return Err(ReconError::shape("Radon::new", "non-empty square domain", &[rows, cols]));
        }
        if angles.is_empty() {
            return Err(ReconError::parameter("angles", 0.0, "at least one projection angle is required"));
        }
        if let Some(&bad) = angles.iter().find(|a| !a.is_finite()) {
            return Err(ReconError::parameter("angles", bad, "angles must be finite"));
        }

        let bins = (std::f64::consts::SQRT_2 * rows as f64).ceil() as usize;
        let padded = (2 * bins).next_power_of_two().max(64);
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(padded);
        let inverse = planner.plan_fft_inverse(padded);
        let response = filter_response(padded, filter, &*forward);

        let mut radon = Self {
            size: rows,
            bins,
            directions: angles.iter().map(|a| (a.cos(), a.sin())).collect(),
            adj_factor: PI / (2.0 * angles.len() as f64),
            angles,
            codomain: 0,
            filter,
            response,
            forward,
            inverse,
        };
        // probe the tracer to fix the co-domain size
        let probe = radon.project_plane(&Array2::zeros((rows, cols)).view());
        radon.codomain = probe.len();
        Ok(radon)
    }

    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn filter(&self) -> FbpFilter {
        self.filter
    }

    /// Normalization carried by the unfiltered back-projection.
    pub fn adj_factor(&self) -> f64 {
        self.adj_factor
    }

    /// Calls `visit(pixel, weight)` for every bilinear contribution along the
    /// ray of `bin` at angle index `angle`.
    fn trace<F>(&self, angle: usize, bin: usize, mut visit: F)
    where
        F: FnMut(usize, f64),
    {
        let n = self.size;
        let center = (n as f64 - 1.0) / 2.0;
        let half = (self.bins as f64 - 1.0) / 2.0;
        let (cos, sin) = self.directions[angle];
        let s = bin as f64 - half;
        for l in 0..self.bins {
            let t = l as f64 - half;
            let x = s * cos - t * sin + center;
            let y = s * sin + t * cos + center;
            let (j0, i0) = (x.floor(), y.floor());
            let (fx, fy) = (x - j0, y - i0);
            for (di, wy) in [(0, 1.0 - fy), (1, fy)] {
                let i = i0 as i64 + di;
                if i < 0 || i >= n as i64 || wy == 0.0 {
                    continue;
                }
                for (dj, wx) in [(0, 1.0 - fx), (1, fx)] {
                    let j = j0 as i64 + dj;
                    if j < 0 || j >= n as i64 || wx == 0.0 {
                        continue;
                    }
                    visit(i as usize * n + j as usize, wy * wx);
                }
            }
        }
    }

    /// Sinogram of one plane, flattened as `bin * angles + angle`.
    fn project_plane(&self, plane: &ArrayView2<f64>) -> Array1<f64> {
        let count = self.angles.len();
        let pixels: Vec<f64> = plane.iter().copied().collect();
        let mut out = Array1::zeros(self.bins * count);
        for bin in 0..self.bins {
            for angle in 0..count {
                let mut acc = 0.0;
                self.trace(angle, bin, |p, w| acc += w * pixels[p]);
                out[bin * count + angle] = acc;
            }
        }
        out
    }

    /// Transpose of [`Radon::project_plane`], written into `plane`.
    fn transpose_plane(&self, sinogram: &ArrayView1<f64>, plane: &mut ArrayViewMut2<f64>) {
        let n = self.size;
        let count = self.angles.len();
        let mut pixels = vec![0.0; n * n];
        for bin in 0..self.bins {
            for angle in 0..count {
                let value = sinogram[bin * count + angle];
                if value != 0.0 {
                    self.trace(angle, bin, |p, w| pixels[p] += w * value);
                }
            }
        }
        plane.iter_mut().zip(pixels).for_each(|(dst, v)| *dst = v);
    }

    /// Ramp-filters every projection of a sinogram along the detector axis.
    fn filter_sinogram(&self, sinogram: &ArrayView1<f64>, out: &mut ArrayViewMut1<f64>) {
        let count = self.angles.len();
        let padded = self.response.len();
        let mut buffer = vec![Complex64::new(0.0, 0.0); padded];
        for angle in 0..count {
            buffer.iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
            for bin in 0..self.bins {
                buffer[bin] = Complex64::new(sinogram[bin * count + angle], 0.0);
            }
            self.forward.process(&mut buffer);
            buffer.iter_mut().zip(self.response.iter()).for_each(|(v, &h)| *v *= h);
            self.inverse.process(&mut buffer);
            for bin in 0..self.bins {
                out[bin * count + angle] = buffer[bin].re / padded as f64;
            }
        }
    }

    fn map_planes<F>(&self, y: &ArrayView3<f64>, per_plane: F) -> ImageBatch
    where
        F: Fn(&ArrayView1<f64>, &mut ArrayViewMut2<f64>) + Sync,
    {
        let (batch, channels, _) = y.dim();
        let n = self.size;
        let mut out = Array4::zeros((batch, channels, n, n));
        Zip::from(out.outer_iter_mut())
            .and(y.outer_iter())
            .par_for_each(|mut item, meas| {
                for (mut plane, sinogram) in item.outer_iter_mut().zip(meas.outer_iter()) {
                    per_plane(&sinogram, &mut plane);
                }
            });
        out
    }

    /// Unfiltered back-projection, scaled by [`Radon::adj_factor`].
    pub fn backproject(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        Ok(self.adj(y)? * self.adj_factor)
    }
}

/// Frequency response of the discrete ramp filter of length `padded`,
/// optionally apodized.
fn filter_response(padded: usize, filter: FbpFilter, fft: &dyn Fft<f64>) -> Array1<f64> {
    let mut kernel = vec![Complex64::new(0.0, 0.0); padded];
    kernel[0] = Complex64::new(0.25, 0.0);
    for (i, value) in kernel.iter_mut().enumerate().skip(1) {
        let distance = i.min(padded - i);
        if distance % 2 == 1 {
            *value = Complex64::new(-1.0 / (PI * distance as f64).powi(2), 0.0);
        }
    }
    fft.process(&mut kernel);
    Array1::from_iter(kernel.iter().enumerate().map(|(k, v)| {
        let ramp = 2.0 * v.re;
        match filter {
            FbpFilter::Ramp => ramp,
            FbpFilter::Hann => ramp * (0.5 + 0.5 * (2.0 * PI * k as f64 / padded as f64).cos()),
        }
    }))
}

impl LinearOperator for Radon {
    fn name(&self) -> &'static str {
        "Radon"
    }

    fn domain(&self) -> (usize, usize) {
        (self.size, self.size)
    }

    fn codomain_len(&self) -> usize {
        self.codomain
    }

    fn dot(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch> {
        check_image(&x, self.domain(), "Radon::dot")?;
        let (batch, channels, _, _) = x.dim();
        let mut out = Array3::zeros((batch, channels, self.codomain));
        Zip::from(out.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut meas, item| {
                for (mut dst, plane) in meas.outer_iter_mut().zip(item.outer_iter()) {
                    dst.assign(&self.project_plane(&plane));
                }
            });
        Ok(out)
    }

    fn adj(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        check_measurement(&y, self.codomain, "Radon::adj")?;
        Ok(self.map_planes(&y, |sinogram, plane| self.transpose_plane(sinogram, plane)))
    }

    /// Filtered back-projection. Approximate: exact only in the limit of
    /// dense angles and fine detector sampling.
    fn inv(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        check_measurement(&y, self.codomain, "Radon::inv")?;
        let back = self.map_planes(&y, |sinogram, plane| {
            let mut filtered = Array1::zeros(sinogram.len());
            self.filter_sinogram(sinogram, &mut filtered.view_mut());
            self.transpose_plane(&filtered.view(), plane);
        });
        Ok(back * self.adj_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::testing::adjoint_mismatch;
    use crate::tensor::norm;
    use ndarray::s;

    fn gaussian_blob(n: usize, sigma: f64) -> Array4<f64> {
        let c = (n as f64 - 1.0) / 2.0;
        Array4::from_shape_fn((1, 1, n, n), |(_, _, i, j)| {
            let r2 = (i as f64 - c - 1.5).powi(2) + (j as f64 - c + 2.0).powi(2);
            (-r2 / (2.0 * sigma * sigma)).exp()
        })
    }

    #[test]
    fn rejects_non_square_domain() {
        let err = Radon::new((8, 9), uniform_angles(4)).unwrap_err();
        assert_eq!(err, ReconError::NonSquareDomain { rows: 8, cols: 9 });
        assert!(Radon::new((8, 8), Vec::new()).is_err());
    }

    #[test]
    fn codomain_is_bins_times_angles() {
        let op = Radon::new((16, 16), uniform_angles(10)).unwrap();
        assert_eq!(op.bins(), 23);
        assert_eq!(op.codomain_len(), 230);
    }

    #[test]
    fn axis_aligned_projections_preserve_mass() {
        let op = Radon::new((9, 9), vec![0.0, PI / 2.0]).unwrap();
        let x = gaussian_blob(9, 1.2);
        let y = op.dot(x.view()).unwrap();
        let total: f64 = x.sum();
        for angle in 0..2 {
            let mass: f64 = y.slice(s![0, 0, ..]).iter().skip(angle).step_by(2).sum();
            assert!((mass - total).abs() < 1e-10 * total);
        }
    }

    #[test]
    fn adjoint_matches_inner_products() {
        let op = Radon::new((12, 12), uniform_angles(7)).unwrap();
        assert!(adjoint_mismatch(&op, 1, 2, 41) < 1e-10);
        assert!(adjoint_mismatch(&op, 2, 1, 42) < 1e-10);
    }

    #[test]
    fn backprojection_carries_adjoint_factor() {
        let op = Radon::new((8, 8), uniform_angles(6)).unwrap();
        let y = crate::operators::testing::random_measurement(3, (1, 1, op.codomain_len()));
        let adj = op.adj(y.view()).unwrap();
        let back = op.backproject(y.view()).unwrap();
        assert!((op.adj_factor() - PI / 12.0).abs() < 1e-15);
        assert!(norm(&(&back - &(adj * op.adj_factor()))) < 1e-12);
    }

    #[test]
    fn filtered_backprojection_recovers_smooth_image() {
        let n = 32;
        let op = Radon::new((n, n), uniform_angles(90)).unwrap();
        let x = gaussian_blob(n, 4.0);
        let y = op.dot(x.view()).unwrap();
        let rec = op.inv(y.view()).unwrap();
        let err = norm(&(&rec - &x)) / norm(&x);
        assert!(err < 0.25, "relative FBP error {err}");
    }

    #[test]
    fn filter_response_vanishes_at_dc_and_hann_rolls_off() {
        let op = Radon::with_filter((8, 8), uniform_angles(4), FbpFilter::Ramp).unwrap();
        let hann = Radon::new((8, 8), uniform_angles(4)).unwrap();
        assert!(op.response[0].abs() < 1e-2);
        let nyquist = op.response.len() / 2;
        assert!((op.response[nyquist] - 1.0).abs() < 1e-2);
        assert!(hann.response[nyquist].abs() < 1e-12);
    }
}
