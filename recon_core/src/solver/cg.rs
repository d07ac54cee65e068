//! Batched preconditioned conjugate gradient on flattened systems.
//!
//! Each row of the `(B, N)` right-hand side is an independent system sharing
//! the same operator. Iteration stops once every row satisfies
//! `‖r‖ ≤ max(rtol·‖b‖, atol)` on the recursively updated residual, or when
//! the iteration budget runs out. Running out is reported, not raised.

use ndarray::{Array1, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};
use crate::tensor::{batch_inner, batch_norms};

/// Batched matrix product on flattened `(B, N)` items.
pub type FlatMatMul<'a> = dyn Fn(ArrayView2<'_, f64>) -> ReconResult<Array2<f64>> + 'a;

/// Stand-in for zero curvature or zero `r·z`, so a breakdown produces a finite
/// step instead of NaN.
const ZERO_DENOMINATOR: f64 = 1e-8;

/// Tolerances and iteration budget of a CG solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgConfig {
    /// Relative tolerance on the residual norm.
    pub rtol: f64,
    /// Absolute tolerance on the residual norm.
    pub atol: f64,
    /// Iteration cap; `None` uses `5 · N`.
    pub max_iter: Option<usize>,
    /// Emit per-iteration residuals at `debug` level.
    pub verbose: bool,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 0.0,
            max_iter: None,
            verbose: false,
        }
    }
}

impl CgConfig {
    pub fn validate(&self) -> ReconResult<()> {
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return Err(ReconError::parameter("rtol", self.rtol, "must be finite and non-negative"));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(ReconError::parameter("atol", self.atol, "must be finite and non-negative"));
        }
        Ok(())
    }

    pub fn max_iter_for(&self, item_len: usize) -> usize {
        self.max_iter.unwrap_or(5 * item_len)
    }
}

/// Outcome of a batched CG solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgDiagnostics {
    /// Iterations performed.
    pub iterations: usize,
    /// Whether every item met its stopping threshold.
    pub converged: bool,
    /// True residual norms `‖A x - b‖` per item at exit.
    pub residual_norms: Vec<f64>,
    /// Stopping thresholds `max(rtol·‖b‖, atol)` per item.
    pub thresholds: Vec<f64>,
}

impl CgDiagnostics {
    pub fn max_residual(&self) -> f64 {
        self.residual_norms.iter().copied().fold(0.0, f64::max)
    }
}

fn guard(mut denominators: Array1<f64>) -> Array1<f64> {
    denominators.mapv_inplace(|d| if d == 0.0 { ZERO_DENOMINATOR } else { d });
    denominators
}

/// `x[i] += coeff[i] · p[i]` row by row.
fn axpy_rows(x: &mut Array2<f64>, coeff: &Array1<f64>, p: &Array2<f64>) {
    Zip::from(x.rows_mut())
        .and(coeff)
        .and(p.rows())
        .for_each(|mut row, &c, p_row| row.scaled_add(c, &p_row));
}

fn apply(op: &FlatMatMul<'_>, x: &Array2<f64>, context: &str) -> ReconResult<Array2<f64>> {
    let out = op(x.view())?;
    if out.dim() != x.dim() {
        return Err(ReconError::shape(
            context,
            format!("{:?}", x.dim()),
            out.shape(),
        ));
    }
    Ok(out)
}

/// Solves `A X = B` for every row of `b`.
///
/// # Arguments
/// * `a` - symmetric positive definite batched product
/// * `b` - right-hand sides, shape `(B, N)`
/// * `m` - optional preconditioner approximating `A⁻¹`
/// * `x0` - initial guess; defaults to `M(b)`, or `b` without preconditioner
///
/// # Returns
/// The last iterate and [`CgDiagnostics`]. Non-convergence is logged at
/// `warn` level and flagged in the diagnostics.
pub fn cg_batch(
    a: &FlatMatMul<'_>,
    b: ArrayView2<'_, f64>,
    m: Option<&FlatMatMul<'_>>,
    x0: Option<ArrayView2<'_, f64>>,
    config: &CgConfig,
) -> ReconResult<(Array2<f64>, CgDiagnostics)> {
    config.validate()?;
    let b = b.to_owned();
    let (_, item_len) = b.dim();
    let precondition = |r: &Array2<f64>| -> ReconResult<Array2<f64>> {
        match m {
            Some(m) => apply(m, r, "cg_batch preconditioner"),
            None => Ok(r.clone()),
        }
    };

    let mut x = match x0 {
        Some(x0) => {
            if x0.dim() != b.dim() {
                return Err(ReconError::shape("cg_batch x0", format!("{:?}", b.dim()), x0.shape()));
            }
            x0.to_owned()
        }
        None => precondition(&b)?,
    };

    let thresholds = batch_norms(&b).mapv(|norm| (config.rtol * norm).max(config.atol));
    let max_iter = config.max_iter_for(item_len);

    let mut r = &b - &apply(a, &x, "cg_batch operator")?;
    let mut z = precondition(&r)?;
    let mut p = z.clone();
    let mut rz = batch_inner(&r, &z);

    let below = |r: &Array2<f64>| {
        batch_norms(r)
            .iter()
            .zip(thresholds.iter())
            .all(|(norm, threshold)| norm <= threshold)
    };

    let mut converged = below(&r);
    let mut iterations = 0;
    while !converged && iterations < max_iter {
        iterations += 1;
        let ap = apply(a, &p, "cg_batch operator")?;
        let alpha = &rz / &guard(batch_inner(&p, &ap));
        axpy_rows(&mut x, &alpha, &p);
        axpy_rows(&mut r, &alpha.mapv(|v| -v), &ap);

        if config.verbose {
            tracing::debug!(
                "cg iteration {}: max residual {:.3e}",
                iterations,
                batch_norms(&r).iter().copied().fold(0.0, f64::max)
            );
        }
        converged = below(&r);
        if converged {
            break;
        }

        z = precondition(&r)?;
        let rz_next = batch_inner(&r, &z);
        let beta = &rz_next / &guard(rz);
        rz = rz_next;
        let mut next = z.clone();
        axpy_rows(&mut next, &beta, &p);
        p = next;
    }

    let residual_norms = batch_norms(&(&apply(a, &x, "cg_batch operator")? - &b));
    if !converged {
        tracing::warn!(
            "cg did not converge within {} iterations; max residual {:.3e}",
            max_iter,
            residual_norms.iter().copied().fold(0.0, f64::max)
        );
    }

    Ok((
        x,
        CgDiagnostics {
            iterations,
            converged,
            residual_norms: residual_norms.to_vec(),
            thresholds: thresholds.to_vec(),
        },
    ))
}
