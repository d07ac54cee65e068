//! Linear measurement and transform operators.
//!
//! Every operator maps image batches `(B, C, H, W)` to measurement batches
//! `(B, C, m)` and back. The defining property each implementation must
//! satisfy is adjointness under the real inner product:
//!
//! ```text
//! ⟨dot(x), y⟩ = ⟨x, adj(y)⟩
//! ```
//!
//! Operators are immutable after construction and shared read-only, so they
//! are `Send + Sync` and can be borrowed by the CG layer and ADMM engine at the
//! same time.

pub mod fft;
pub mod fourier;
pub mod fourier_matrix;
pub mod radon;
pub mod tv;
pub mod wavelet;

use ndarray::{Array2, ArrayView2, ArrayView3, ArrayView4};

use crate::error::{ReconError, ReconResult};
use crate::tensor::{ImageBatch, MeasBatch};

pub use fourier::Fourier;
pub use fourier_matrix::FourierMatrix;
pub use radon::{uniform_angles, FbpFilter, Radon};
pub use tv::TvAnalysisPeriodic;
pub use wavelet::{BandKind, BandSpec, Subbands, Wavelet, WaveletLayout};

/// Contract shared by all measurement and regularization operators.
pub trait LinearOperator: Send + Sync {
    /// Short operator name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Image domain `(H, W)`.
    fn domain(&self) -> (usize, usize);

    /// Co-domain size `m`.
    fn codomain_len(&self) -> usize;

    /// Forward application `A x`.
    fn dot(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch>;

    /// Adjoint application `A* y`.
    fn adj(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch>;

    /// Operator-specific generalized inverse.
    ///
    /// Operators without a closed form return [`ReconError::Unsupported`];
    /// callers fall back to the CG layer.
    fn inv(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        let _ = y;
        Err(ReconError::unsupported(self.name(), "inv"))
    }

    /// Shorthand for [`LinearOperator::dot`].
    fn apply(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch> {
        self.dot(x)
    }

    /// Diagonal of `W* W` in the centered Fourier domain, if the operator is
    /// circulant.
    fn fourier_kernel(&self) -> Option<Array2<f64>> {
        None
    }

    /// Whether [`LinearOperator::tikh`] is implemented.
    fn supports_tikh(&self) -> bool {
        false
    }

    /// Closed-form solve of `(A* A + rho W* W) x = rhs` when `W* W` is
    /// diagonalized by the DFT with diagonal `kernel`.
    fn tikh(
        &self,
        rhs: ArrayView4<'_, f64>,
        kernel: ArrayView2<'_, f64>,
        rho: f64,
    ) -> ReconResult<ImageBatch> {
        let _ = (rhs, kernel, rho);
        Err(ReconError::unsupported(self.name(), "tikh"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use ndarray::{Array3, Array4};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    use super::LinearOperator;
    use crate::tensor::inner;

    pub fn random_image(seed: u64, shape: (usize, usize, usize, usize)) -> Array4<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array4::from_shape_simple_fn(shape, || StandardNormal.sample(&mut rng))
    }

    pub fn random_measurement(seed: u64, shape: (usize, usize, usize)) -> Array3<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_simple_fn(shape, || StandardNormal.sample(&mut rng))
    }

    /// Relative mismatch between ⟨Ax, y⟩ and ⟨x, A*y⟩.
    pub fn adjoint_mismatch<O: LinearOperator>(op: &O, channels: usize, batch: usize, seed: u64) -> f64 {
        let (rows, cols) = op.domain();
        let x = random_image(seed, (batch, channels, rows, cols));
        let ax = op.dot(x.view()).expect("dot");
        let y = random_measurement(seed + 1, ax.dim());
        let aty = op.adj(y.view()).expect("adj");
        let lhs = inner(&ax, &y);
        let rhs = inner(&x, &aty);
        (lhs - rhs).abs() / lhs.abs().max(rhs.abs()).max(1e-12)
    }
}
