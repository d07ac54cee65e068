//! Reconstruction error metrics.

use ndarray::{s, Array1, Array2, ArrayView3, ArrayView4, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};
use crate::tensor::layout::reshape_owned;
use crate::tensor::{batch_norms, norm};

/// Options shared by [`l2_error`] and [`l2_error_meas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOptions {
    /// Divide by the norm of the reference.
    pub relative: bool,
    /// Report squared norms.
    pub squared: bool,
    /// Compare complex magnitudes instead of real/imaginary channels.
    pub use_magnitude: bool,
}

impl Default for ErrorOptions {
    fn default() -> Self {
        Self {
            relative: false,
            squared: false,
            use_magnitude: true,
        }
    }
}

impl ErrorOptions {
    pub fn relative() -> Self {
        Self {
            relative: true,
            ..Self::default()
        }
    }
}

/// Mean over the batch together with the per-item errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    pub mean: f64,
    pub per_item: Vec<f64>,
}

fn finish(diff: Array1<f64>, reference: Array1<f64>, options: ErrorOptions) -> BatchError {
    let per_item: Vec<f64> = diff
        .iter()
        .zip(reference.iter())
        .map(|(&d, &r)| {
            let (d, r) = if options.squared { (d * d, r * r) } else { (d, r) };
            if options.relative {
                d / r
            } else {
                d
            }
        })
        .collect();
    let mean = if per_item.is_empty() {
        0.0
    } else {
        per_item.iter().sum::<f64>() / per_item.len() as f64
    };
    BatchError { mean, per_item }
}

/// Per-item flattened rows, replacing complex channels by magnitudes when asked.
fn image_rows(x: &ArrayView4<f64>, magnitude: bool) -> ReconResult<Array2<f64>> {
    let (batch, channels, rows, cols) = x.dim();
    if channels == 2 && magnitude {
        let mag = Zip::from(x.slice(s![.., 0, .., ..]))
            .and(x.slice(s![.., 1, .., ..]))
            .map_collect(|&re, &im| re.hypot(im));
        reshape_owned(&mag, (batch, rows * cols))
    } else {
        reshape_owned(x, (batch, channels * rows * cols))
    }
}

/// l2 error of an image batch against a reference of the same shape.
pub fn l2_error(x: ArrayView4<'_, f64>, x_ref: ArrayView4<'_, f64>, options: ErrorOptions) -> ReconResult<BatchError> {
    if x.shape() != x_ref.shape() {
        return Err(ReconError::shape("l2_error", format!("{:?}", x_ref.shape()), x.shape()));
    }
    let a = image_rows(&x, options.use_magnitude)?;
    let b = image_rows(&x_ref, options.use_magnitude)?;
    Ok(finish(batch_norms(&(&a - &b)), batch_norms(&b), options))
}

/// l2 error of a measurement batch; channels are always compared directly.
pub fn l2_error_meas(y: ArrayView3<'_, f64>, y_ref: ArrayView3<'_, f64>, options: ErrorOptions) -> ReconResult<BatchError> {
    if y.shape() != y_ref.shape() {
        return Err(ReconError::shape("l2_error_meas", format!("{:?}", y_ref.shape()), y.shape()));
    }
    let diff = batch_norms(&(&y - &y_ref));
    let reference = y_ref.axis_iter(Axis(0)).map(|item| norm(&item)).collect();
    Ok(finish(diff, reference, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    #[test]
    fn relative_error_of_scaled_image() {
        let x_ref = Array4::from_elem((2, 1, 3, 3), 2.0);
        let x = &x_ref * 1.1;
        let err = l2_error(x.view(), x_ref.view(), ErrorOptions::relative()).unwrap();
        assert!((err.mean - 0.1).abs() < 1e-12);
        assert_eq!(err.per_item.len(), 2);
    }

    #[test]
    fn magnitude_ignores_phase() {
        let mut x_ref = Array4::zeros((1, 2, 2, 2));
        x_ref.slice_mut(s![.., 0, .., ..]).fill(1.0);
        let mut x = Array4::zeros((1, 2, 2, 2));
        x.slice_mut(s![.., 1, .., ..]).fill(1.0);
        let magnitude = l2_error(x.view(), x_ref.view(), ErrorOptions::default()).unwrap();
        assert!(magnitude.mean.abs() < 1e-12);
        let channels = ErrorOptions {
            use_magnitude: false,
            ..ErrorOptions::default()
        };
        let direct = l2_error(x.view(), x_ref.view(), channels).unwrap();
        assert!((direct.mean - 8f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn squared_measurement_error() {
        let y_ref = Array3::from_elem((1, 2, 4), 1.0);
        let y = Array3::from_elem((1, 2, 4), 1.5);
        let options = ErrorOptions {
            relative: true,
            squared: true,
            use_magnitude: false,
        };
        let err = l2_error_meas(y.view(), y_ref.view(), options).unwrap();
        assert!((err.mean - 0.25).abs() < 1e-12);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let a = Array4::<f64>::zeros((1, 1, 2, 2));
        let b = Array4::<f64>::zeros((1, 1, 2, 3));
        assert!(l2_error(a.view(), b.view(), ErrorOptions::default()).is_err());
    }
}
