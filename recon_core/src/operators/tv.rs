//! Periodic finite-difference (total variation) analysis operator.

use std::f64::consts::PI;

use ndarray::{s, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis, Zip};

use super::LinearOperator;
use crate::error::ReconResult;
use crate::tensor::{check_image, check_measurement, circshift, ImageBatch, MeasBatch};

/// `x ↦ [vec(Dr x), vec(Dc x)]` with circular forward differences
/// `Dr x[i, j] = x[i+1, j] - x[i, j]` and `Dc x[i, j] = x[i, j+1] - x[i, j]`.
///
/// The operator is circulant, so `WᵀW` is diagonal in the Fourier domain;
/// see [`LinearOperator::fourier_kernel`]. Constant images lie in its null
/// space and `inv` is not provided.
#[derive(Debug, Clone)]
pub struct TvAnalysisPeriodic {
    rows: usize,
    cols: usize,
}

impl TvAnalysisPeriodic {
    pub fn new(domain: (usize, usize)) -> Self {
        Self {
            rows: domain.0,
            cols: domain.1,
        }
    }

    fn plane_len(&self) -> usize {
        self.rows * self.cols
    }
}

impl LinearOperator for TvAnalysisPeriodic {
    fn name(&self) -> &'static str {
        "TvAnalysisPeriodic"
    }

    fn domain(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn codomain_len(&self) -> usize {
        2 * self.plane_len()
    }

    fn dot(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch> {
        check_image(&x, self.domain(), "TvAnalysisPeriodic::dot")?;
        let (batch, channels, _, _) = x.dim();
        let len = self.plane_len();
        let mut out = Array3::zeros((batch, channels, 2 * len));
        Zip::from(out.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut meas, item| {
                for (mut dst, plane) in meas.outer_iter_mut().zip(item.outer_iter()) {
                    let rows = circshift(&plane, Axis(0), 1) - &plane;
                    let cols = circshift(&plane, Axis(1), 1) - &plane;
                    dst.slice_mut(s![..len])
                        .iter_mut()
                        .zip(rows.iter())
                        .for_each(|(d, &v)| *d = v);
                    dst.slice_mut(s![len..])
                        .iter_mut()
                        .zip(cols.iter())
                        .for_each(|(d, &v)| *d = v);
                }
            });
        Ok(out)
    }

    fn adj(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        check_measurement(&y, self.codomain_len(), "TvAnalysisPeriodic::adj")?;
        let (batch, channels, _) = y.dim();
        let (rows, cols) = self.domain();
        let len = self.plane_len();
        let mut out = Array4::zeros((batch, channels, rows, cols));
        Zip::from(out.outer_iter_mut())
            .and(y.outer_iter())
            .par_for_each(|mut item, meas| {
                for (mut plane, coeffs) in item.outer_iter_mut().zip(meas.outer_iter()) {
                    let yr = Array2::from_shape_fn((rows, cols), |(i, j)| coeffs[i * cols + j]);
                    let yc = Array2::from_shape_fn((rows, cols), |(i, j)| coeffs[len + i * cols + j]);
                    let back = circshift(&yr.view(), Axis(0), rows - 1) - &yr
                        + circshift(&yc.view(), Axis(1), cols - 1)
                        - &yc;
                    plane.assign(&back);
                }
            });
        Ok(out)
    }

    /// `K[u, v] = 4 - 2cos(2π(u - H/2)/H) - 2cos(2π(v - W/2)/W)`, the centered
    /// DFT of the periodic 5-point Laplacian stencil.
    fn fourier_kernel(&self) -> Option<Array2<f64>> {
        let (rows, cols) = (self.rows as f64, self.cols as f64);
        let (hr, hc) = ((self.rows / 2) as f64, (self.cols / 2) as f64);
        Some(Array2::from_shape_fn((self.rows, self.cols), |(u, v)| {
            4.0 - 2.0 * (2.0 * PI * (u as f64 - hr) / rows).cos() - 2.0 * (2.0 * PI * (v as f64 - hc) / cols).cos()
        }))
    }
}
