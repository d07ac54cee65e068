//! Reductions over real-valued tensors: the real inner product used by the
//! adjointness contract, and per-item norms for batched solvers.

use ndarray::{Array1, ArrayBase, Axis, Data, Dimension, RemoveAxis, Zip};
use rayon::prelude::*;

/// Real inner product over all elements (real and imaginary channels alike).
///
/// # Panics
///
/// Panics if the shapes differ.
pub fn inner<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    assert_eq!(a.shape(), b.shape(), "inner product of mismatched shapes");
    Zip::from(a).and(b).fold(0.0, |acc, &x, &y| acc + x * y)
}

/// Euclidean norm over all elements.
pub fn norm<S, D>(a: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    a.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Euclidean norm of each item along the leading (batch) axis.
pub fn batch_norms<S, D>(a: &ArrayBase<S, D>) -> Array1<f64>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    let norms: Vec<f64> = a.axis_iter(Axis(0)).into_par_iter().map(|item| norm(&item)).collect();
    Array1::from(norms)
}

/// Per-item inner products along the leading (batch) axis.
pub fn batch_inner<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> Array1<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    assert_eq!(a.shape(), b.shape(), "inner product of mismatched shapes");
    let products: Vec<f64> = a
        .axis_iter(Axis(0))
        .into_par_iter()
        .zip(b.axis_iter(Axis(0)).into_par_iter())
        .map(|(x, y)| inner(&x, &y))
        .collect();
    Array1::from(products)
}
