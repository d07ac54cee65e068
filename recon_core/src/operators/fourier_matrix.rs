//! Subsampled Fourier operator evaluated with dense 1D DFT matrices.
//!
//! The centered 2D DFT factors as `Y = F_H · X · F_Wᵀ`, so the operator is two
//! real matrix products per component instead of an FFT. Results agree with
//! [`Fourier`](super::Fourier) to rounding.

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Zip};
use rustfft::FftDirection;

use super::fft::DftMatrix;
use super::fourier::{combined_kernel, SampledPositions};
use super::LinearOperator;
use crate::error::{ReconError, ReconResult};
use crate::tensor::{check_image, check_measurement, to_complex, ImageBatch, MeasBatch};

#[derive(Debug, Clone)]
pub struct FourierMatrix {
    mask: Array2<bool>,
    sampled: SampledPositions,
    forward_h: DftMatrix,
    forward_w: DftMatrix,
    inverse_h: DftMatrix,
    inverse_w: DftMatrix,
}

impl FourierMatrix {
    pub fn new(mask: Array2<bool>) -> ReconResult<Self> {
        let sampled = SampledPositions::from_mask(&mask)?;
        let (rows, cols) = mask.dim();
        Ok(Self {
            mask,
            sampled,
            forward_h: DftMatrix::centered(rows, FftDirection::Forward),
            forward_w: DftMatrix::centered(cols, FftDirection::Forward),
            inverse_h: DftMatrix::centered(rows, FftDirection::Inverse),
            inverse_w: DftMatrix::centered(cols, FftDirection::Inverse),
        })
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    fn forward_grid(&self, re: &ArrayView2<f64>, im: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (tr, ti) = self.forward_w.right_transposed(re, im);
        self.forward_h.left(&tr.view(), &ti.view())
    }

    fn inverse_grid(&self, re: &ArrayView2<f64>, im: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (tr, ti) = self.inverse_w.right_transposed(re, im);
        self.inverse_h.left(&tr.view(), &ti.view())
    }

    /// Applies `map` to the `(re, im)` planes of every complex item.
    fn map_items<F>(&self, x: &ArrayView4<f64>, map: F) -> ImageBatch
    where
        F: Fn(&ArrayView2<f64>, &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) + Sync,
    {
        let mut out = Array4::zeros(x.raw_dim());
        Zip::from(out.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut dst, src| {
                let (re, im) = map(&src.slice(s![0, .., ..]), &src.slice(s![1, .., ..]));
                dst.slice_mut(s![0, .., ..]).assign(&re);
                dst.slice_mut(s![1, .., ..]).assign(&im);
            });
        out
    }
}

impl LinearOperator for FourierMatrix {
    fn name(&self) -> &'static str {
        "FourierMatrix"
    }

    fn domain(&self) -> (usize, usize) {
        self.mask.dim()
    }

    fn codomain_len(&self) -> usize {
        self.sampled.len()
    }

    fn dot(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch> {
        check_image(&x, self.domain(), "FourierMatrix::dot")?;
        let complex = to_complex(&x)?;
        let spectrum = self.map_items(&complex.view(), |re, im| self.forward_grid(re, im));
        let mut out = Array3::zeros((spectrum.dim().0, 2, self.codomain_len()));
        Zip::from(out.outer_iter_mut())
            .and(spectrum.outer_iter())
            .par_for_each(|meas, item| {
                self.sampled
                    .gather(&item.slice(s![0, .., ..]), &item.slice(s![1, .., ..]), meas)
            });
        Ok(out)
    }

    fn adj(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        if check_measurement(&y, self.codomain_len(), "FourierMatrix::adj")?.channels() != 2 {
            return Err(ReconError::InvalidChannels {
                context: "FourierMatrix::adj".into(),
                got: 1,
            });
        }
        let (rows, cols) = self.domain();
        let mut out = Array4::zeros((y.dim().0, 2, rows, cols));
        Zip::from(out.outer_iter_mut())
            .and(y.outer_iter())
            .par_for_each(|mut item, meas| {
                let (re, im) = self.sampled.scatter(&meas);
                let (xr, xi) = self.inverse_grid(&re.view(), &im.view());
                item.slice_mut(s![0, .., ..]).assign(&xr);
                item.slice_mut(s![1, .., ..]).assign(&xi);
            });
        Ok(out)
    }

    fn inv(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        self.adj(y)
    }

    fn supports_tikh(&self) -> bool {
        true
    }

    fn tikh(
        &self,
        rhs: ArrayView4<'_, f64>,
        kernel: ArrayView2<'_, f64>,
        rho: f64,
    ) -> ReconResult<ImageBatch> {
        check_image(&rhs, self.domain(), "FourierMatrix::tikh")?;
        let combined = combined_kernel(self.name(), &self.mask, &kernel, rho)?;
        let complex = to_complex(&rhs)?;
        Ok(self.map_items(&complex.view(), |re, im| {
            let (sr, si) = self.forward_grid(re, im);
            self.inverse_grid(&(sr / &combined).view(), &(si / &combined).view())
        }))
    }
}
