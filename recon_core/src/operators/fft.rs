//! Centered, orthonormal discrete Fourier transforms.
//!
//! The centered transform is `fftshift(FFT(ifftshift(x))) / √N`, which keeps
//! the zero frequency in the middle of the grid where radial sampling masks
//! put their spokes. Both directions use the same shift pattern.

use std::sync::Arc;

use ndarray::{Array2, ArrayBase, ArrayView2, DataMut, Ix2};
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};

/// Planned 2D centered FFT for a fixed grid size.
#[derive(Clone)]
pub struct CenteredFft2 {
    rows: usize,
    cols: usize,
    forward_rows: Arc<dyn Fft<f64>>,
    forward_cols: Arc<dyn Fft<f64>>,
    inverse_rows: Arc<dyn Fft<f64>>,
    inverse_cols: Arc<dyn Fft<f64>>,
    scale: f64,
}

impl std::fmt::Debug for CenteredFft2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CenteredFft2")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl CenteredFft2 {
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            rows,
            cols,
            // `*_rows` transforms each row (length `cols`), `*_cols` each column.
            forward_rows: planner.plan_fft_forward(cols),
            forward_cols: planner.plan_fft_forward(rows),
            inverse_rows: planner.plan_fft_inverse(cols),
            inverse_cols: planner.plan_fft_inverse(rows),
            scale: 1.0 / ((rows * cols) as f64).sqrt(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// In-place forward transform of a `(rows, cols)` grid.
    pub fn forward<S>(&self, grid: &mut ArrayBase<S, Ix2>)
    where
        S: DataMut<Elem = Complex64>,
    {
        self.transform(grid, &*self.forward_rows, &*self.forward_cols);
    }

    /// In-place inverse transform of a `(rows, cols)` grid.
    pub fn inverse<S>(&self, grid: &mut ArrayBase<S, Ix2>)
    where
        S: DataMut<Elem = Complex64>,
    {
        self.transform(grid, &*self.inverse_rows, &*self.inverse_cols);
    }

    fn transform<S>(&self, grid: &mut ArrayBase<S, Ix2>, along_rows: &dyn Fft<f64>, along_cols: &dyn Fft<f64>)
    where
        S: DataMut<Elem = Complex64>,
    {
        let (rows, cols) = (self.rows, self.cols);
        debug_assert_eq!(grid.dim(), (rows, cols));

        // ifftshift while gathering into a row-major buffer
        let mut buffer = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            let si = (i + rows / 2) % rows;
            for j in 0..cols {
                buffer.push(grid[[si, (j + cols / 2) % cols]]);
            }
        }
        along_rows.process(&mut buffer);

        let mut transposed = vec![Complex64::new(0.0, 0.0); rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                transposed[j * rows + i] = buffer[i * cols + j];
            }
        }
        along_cols.process(&mut transposed);

        // fftshift while scattering back
        for i in 0..rows {
            let si = (i + rows - rows / 2) % rows;
            for j in 0..cols {
                let sj = (j + cols - cols / 2) % cols;
                grid[[i, j]] = transposed[sj * rows + si] * self.scale;
            }
        }
    }
}

/// Dense centered 1D DFT matrix split into real and imaginary parts.
#[derive(Debug, Clone)]
pub struct DftMatrix {
    pub re: Array2<f64>,
    pub im: Array2<f64>,
}

impl DftMatrix {
    /// Builds the matrix column by column by transforming unit vectors, so it
    /// agrees with [`CenteredFft2`] by construction.
    pub fn centered(n: usize, direction: FftDirection) -> Self {
        let mut planner = FftPlanner::new();
        let plan = planner.plan_fft(n, direction);
        let scale = 1.0 / (n as f64).sqrt();
        let mut re = Array2::zeros((n, n));
        let mut im = Array2::zeros((n, n));
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        for j in 0..n {
            buffer.iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
            // ifftshift(e_j) has its one at index (j - n/2) mod n
            buffer[(j + n - n / 2) % n] = Complex64::new(1.0, 0.0);
            plan.process(&mut buffer);
            for k in 0..n {
                let value = buffer[(k + n - n / 2) % n] * scale;
                re[[k, j]] = value.re;
                im[[k, j]] = value.im;
            }
        }
        Self { re, im }
    }

    /// `M · X` for a complex matrix `X = xr + i·xi`.
    pub fn left(&self, xr: &ArrayView2<f64>, xi: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        let yr = self.re.dot(xr) - self.im.dot(xi);
        let yi = self.re.dot(xi) + self.im.dot(xr);
        (yr, yi)
    }

    /// `X · Mᵀ` for a complex matrix `X = xr + i·xi`.
    pub fn right_transposed(&self, xr: &ArrayView2<f64>, xi: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        let yr = xr.dot(&self.re.t()) - xi.dot(&self.im.t());
        let yi = xr.dot(&self.im.t()) + xi.dot(&self.re.t());
        (yr, yi)
    }
}
