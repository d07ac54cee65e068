//! Subsampled 2D Fourier operator.

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, ArrayViewMut2, Zip};
use rustfft::num_complex::Complex64;

use super::fft::CenteredFft2;
use super::LinearOperator;
use crate::error::{ReconError, ReconResult};
use crate::tensor::{check_image, check_measurement, prep_fft_channel, to_complex, unprep_fft_channel, ImageBatch, MeasBatch};

/// Row-major positions of the `true` entries of a sampling mask.
#[derive(Debug, Clone)]
pub(crate) struct SampledPositions {
    shape: (usize, usize),
    positions: Vec<(usize, usize)>,
}

impl SampledPositions {
    pub(crate) fn from_mask(mask: &Array2<bool>) -> ReconResult<Self> {
        let shape = mask.dim();
        if shape.0 == 0 || shape.1 == 0 {
            return Err(ReconError::shape("sampling mask", "non-empty (H, W)", mask.shape()));
        }
        let positions = mask
            .indexed_iter()
            .filter(|(_, &keep)| keep)
            .map(|(idx, _)| idx)
            .collect();
        Ok(Self { shape, positions })
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }

    /// Copies sampled entries of `(re, im)` grids into a `(2, m)` measurement.
    pub(crate) fn gather(&self, re: &ArrayView2<f64>, im: &ArrayView2<f64>, mut out: ArrayViewMut2<f64>) {
        for (k, &(i, j)) in self.positions.iter().enumerate() {
            out[[0, k]] = re[[i, j]];
            out[[1, k]] = im[[i, j]];
        }
    }

    /// Zero-filled `(re, im)` grids holding a `(2, m)` measurement.
    pub(crate) fn scatter(&self, meas: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        let mut re = Array2::zeros(self.shape);
        let mut im = Array2::zeros(self.shape);
        for (k, &(i, j)) in self.positions.iter().enumerate() {
            re[[i, j]] = meas[[0, k]];
            im[[i, j]] = meas[[1, k]];
        }
        (re, im)
    }
}

/// Checks the kernel/rho pair of a Tikhonov solve and builds `mask + rho·kernel`.
pub(crate) fn combined_kernel(
    name: &str,
    mask: &Array2<bool>,
    kernel: &ArrayView2<f64>,
    rho: f64,
) -> ReconResult<Array2<f64>> {
    if kernel.dim() != mask.dim() {
        return Err(ReconError::shape(
            "tikh kernel",
            format!("{:?}", mask.dim()),
            kernel.shape(),
        ));
    }
    if !rho.is_finite() || rho < 0.0 {
        return Err(ReconError::parameter("rho", rho, "must be finite and non-negative"));
    }
    let mut combined = kernel.mapv(|k| rho * k);
    Zip::from(&mut combined).and(mask).for_each(|c, &m| {
        if m {
            *c += 1.0;
        }
    });
    if let Some(((i, j), _)) = combined.indexed_iter().find(|(_, &v)| v == 0.0) {
        return Err(ReconError::SingularSystem {
            context: format!("{name}::tikh"),
            details: format!("frequency ({i}, {j}) is unsampled and lies in the kernel null space"),
        });
    }
    Ok(combined)
}

/// Complex operator `C^(H×W) → C^m`: centered orthonormal 2D DFT followed by
/// selection of the masked frequencies in row-major order.
///
/// Rows of the operator are orthonormal, so the zero-filled inverse DFT is
/// both the adjoint and the pseudo-inverse.
#[derive(Debug, Clone)]
pub struct Fourier {
    mask: Array2<bool>,
    sampled: SampledPositions,
    fft: CenteredFft2,
}

impl Fourier {
    pub fn new(mask: Array2<bool>) -> ReconResult<Self> {
        let sampled = SampledPositions::from_mask(&mask)?;
        let (rows, cols) = mask.dim();
        Ok(Self {
            mask,
            sampled,
            fft: CenteredFft2::new(rows, cols),
        })
    }

    /// Like [`Fourier::new`], additionally checking the mask against an
    /// expected domain.
    pub fn with_domain(domain: (usize, usize), mask: Array2<bool>) -> ReconResult<Self> {
        if mask.dim() != domain {
            return Err(ReconError::MaskMismatch {
                mask: mask.dim(),
                domain,
            });
        }
        Self::new(mask)
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    fn spectrum(&self, x: &ArrayView4<f64>) -> ReconResult<Array3<Complex64>> {
        check_image(x, self.domain(), "Fourier")?;
        let complex = to_complex(x)?;
        let mut grids = prep_fft_channel(&complex.view())?;
        Zip::from(grids.outer_iter_mut()).par_for_each(|mut grid| self.fft.forward(&mut grid));
        Ok(grids)
    }

    fn inverse_spectrum(&self, grids: &mut Array3<Complex64>) -> ImageBatch {
        Zip::from(grids.outer_iter_mut()).par_for_each(|mut grid: ArrayViewMut2<Complex64>| self.fft.inverse(&mut grid));
        unprep_fft_channel(&grids.view())
    }
}

impl LinearOperator for Fourier {
    fn name(&self) -> &'static str {
        "Fourier"
    }

    fn domain(&self) -> (usize, usize) {
        self.mask.dim()
    }

    fn codomain_len(&self) -> usize {
        self.sampled.len()
    }

    fn dot(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch> {
        let spectrum = unprep_fft_channel(&self.spectrum(&x)?.view());
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
        if check_measurement(&y, self.codomain_len(), "Fourier::adj")?.channels() != 2 {
            return Err(ReconError::InvalidChannels {
                context: "Fourier::adj".into(),
                got: 1,
            });
        }
        let (rows, cols) = self.domain();
        let mut filled = Array4::zeros((y.dim().0, 2, rows, cols));
        Zip::from(filled.outer_iter_mut())
            .and(y.outer_iter())
            .par_for_each(|mut item, meas| {
                let (re, im) = self.sampled.scatter(&meas);
                item.slice_mut(s![0, .., ..]).assign(&re);
                item.slice_mut(s![1, .., ..]).assign(&im);
            });
        let mut grids = prep_fft_channel(&filled.view())?;
        Ok(self.inverse_spectrum(&mut grids))
    }

    fn inv(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        self.adj(y)
    }

    fn supports_tikh(&self) -> bool {
        true
    }

    /// Solves `(Mask + rho·Kernel) X̂ = F(rhs)` elementwise in frequency space.
    fn tikh(
        &self,
        rhs: ArrayView4<'_, f64>,
        kernel: ArrayView2<'_, f64>,
        rho: f64,
    ) -> ReconResult<ImageBatch> {
        let combined = combined_kernel(self.name(), &self.mask, &kernel, rho)?;
        let mut grids = self.spectrum(&rhs)?;
        Zip::from(grids.outer_iter_mut()).par_for_each(|mut grid| {
            Zip::from(&mut grid).and(&combined).for_each(|g, &k| *g /= k);
        });
        Ok(self.inverse_spectrum(&mut grids))
    }
}
