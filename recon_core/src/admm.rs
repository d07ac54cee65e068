//! Scaled-form ADMM for the analysis-sparse problem
//!
//! ```text
//! min_x ½‖A x − y‖² + λ ‖W x‖₁
//! ```
//!
//! split as `W x = z`. Each iteration performs
//!
//! 1. `x ← argmin ½‖A x − y‖² + ρ/2 ‖W x − z + u‖²`, i.e. solves
//!    `(AᵀA + ρWᵀW) x = Aᵀy + ρWᵀ(z − u)`,
//! 2. `z ← shrink(W x + u, λ/ρ)`,
//! 3. `u ← u + W x − z`.
//!
//! The x-update is solved in closed form when `A` supports
//! [`LinearOperator::tikh`] and `W` is circulant ([`XUpdate::Diagonal`]);
//! otherwise the normal equations go through the CG layer, warm-started at
//! the previous iterate ([`XUpdate::ConjugateGradient`]).

use ndarray::{Array2, Array3, ArrayView3, ArrayView4};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};
use crate::operators::LinearOperator;
use crate::prox::shrink;
use crate::solver::{CgConfig, CgDiagnostics, CgInverterLayer, ImageMatMul};
use crate::tensor::{norm, ImageBatch, MeasBatch};

/// How the x-update linear system is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XUpdate {
    /// Closed-form Fourier-diagonal solve via [`LinearOperator::tikh`].
    Diagonal,
    /// Matrix-free CG on the normal equations.
    ConjugateGradient,
}

/// Iteration budget, stopping rule and reporting options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmmConfig {
    /// Iteration budget
    pub max_iter: usize,
    /// Early exit once both residual norms fall below this value
    pub tol: Option<f64>,
    /// Suppress progress logging
    pub silent: bool,
    /// Progress is logged every `log_every` iterations
    pub log_every: usize,
    /// Keep one [`IterateRecord`] per iteration
    pub record_history: bool,
    /// Settings of the inner CG solve
    pub cg: CgConfig,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tol: None,
            silent: false,
            log_every: 100,
            record_history: false,
            cg: CgConfig::default(),
        }
    }
}

impl AdmmConfig {
    pub fn validate(&self) -> ReconResult<()> {
        if let Some(tol) = self.tol {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(ReconError::parameter("tol", tol, "must be finite and positive"));
            }
        }
        if self.log_every == 0 {
            return Err(ReconError::parameter("log_every", 0.0, "must be at least 1"));
        }
        self.cg.validate()
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmmStatus {
    /// Both residuals met `tol` at `iteration`.
    Converged { iteration: usize },
    /// The full `max_iter` budget was spent.
    IterationBudgetExhausted,
}

/// Primal, split and scaled dual variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmmState {
    pub x: ImageBatch,
    pub z: MeasBatch,
    pub u: MeasBatch,
}

/// Per-iteration diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateRecord {
    pub iteration: usize,
    /// `‖W x − z‖`
    pub primal_residual: f64,
    /// `ρ ‖Wᵀ(z − z_prev)‖`
    pub dual_residual: f64,
    /// Augmented Lagrangian `½‖Ax − y‖² + λ‖z‖₁ + ρ/2‖Wx − z + u‖² − ρ/2‖u‖²`,
    /// evaluated after the z-update and before the dual step.
    pub lagrangian: f64,
    /// Inner solve diagnostics on the CG path.
    pub cg: Option<CgDiagnostics>,
}

#[derive(Debug, Clone)]
pub struct AdmmOutput {
    pub x: ImageBatch,
    pub state: AdmmState,
    pub status: AdmmStatus,
    pub iterations: usize,
    pub history: Vec<IterateRecord>,
    pub x_update: XUpdate,
}

/// The fixed data of one solve.
struct Problem<'a> {
    y: ArrayView3<'a, f64>,
    a: &'a dyn LinearOperator,
    w: &'a dyn LinearOperator,
    lam: f64,
    rho: f64,
}

impl<'a> Problem<'a> {
    fn lagrangian(&self, x: &ArrayView4<f64>, wx: &Array3<f64>, z: &Array3<f64>, u: &Array3<f64>) -> ReconResult<f64> {
        let residual = &self.a.dot(*x)? - &self.y;
        let fidelity = 0.5 * norm(&residual).powi(2);
        let sparsity = self.lam * z.iter().map(|v| v.abs()).sum::<f64>();
        let split = norm(&(&(wx - z) + u)).powi(2);
        Ok(fidelity + sparsity + 0.5 * self.rho * (split - norm(u).powi(2)))
    }
}

/// Closed-form or iterative solver for the x-update.
enum XSolver<'a> {
    Diagonal { kernel: Array2<f64> },
    Cg(CgInverterLayer<'a>),
}

impl<'a> XSolver<'a> {
    fn build(strategy: XUpdate, problem: &Problem<'a>, item_shape: (usize, usize, usize), cg: CgConfig) -> ReconResult<Self> {
        match strategy {
            XUpdate::Diagonal => {
                if !problem.a.supports_tikh() {
                    return Err(ReconError::unsupported(problem.a.name(), "tikh"));
                }
                let kernel = problem
                    .w
                    .fourier_kernel()
                    .ok_or_else(|| ReconError::unsupported(problem.w.name(), "fourier_kernel"))?;
                Ok(XSolver::Diagonal { kernel })
            }
            XUpdate::ConjugateGradient => {
                let (a, w, rho) = (problem.a, problem.w, problem.rho);
                let normal: ImageMatMul<'a> = Box::new(move |x| {
                    let mut out = a.adj(a.dot(x)?.view())?;
                    out.scaled_add(rho, &w.adj(w.dot(x)?.view())?);
                    Ok(out)
                });
                Ok(XSolver::Cg(CgInverterLayer::new(item_shape, normal).with_config(cg)))
            }
        }
    }

    fn solve(&self, problem: &Problem<'_>, rhs: ArrayView4<'_, f64>, previous: ArrayView4<'_, f64>) -> ReconResult<(ImageBatch, Option<CgDiagnostics>)> {
        match self {
            XSolver::Diagonal { kernel } => Ok((problem.a.tikh(rhs, kernel.view(), problem.rho)?, None)),
            XSolver::Cg(layer) => {
                let (x, diagnostics) = layer.solve(rhs, Some(previous))?;
                Ok((x, Some(diagnostics)))
            }
        }
    }
}

fn validate(problem: &Problem<'_>, x0: &ArrayView4<f64>, z0: &ArrayView3<f64>) -> ReconResult<()> {
    if !(problem.rho.is_finite() && problem.rho > 0.0) {
        return Err(ReconError::parameter("rho", problem.rho, "must be finite and positive"));
    }
    if !(problem.lam.is_finite() && problem.lam >= 0.0) {
        return Err(ReconError::parameter("lam", problem.lam, "must be finite and non-negative"));
    }
    let domain = problem.a.domain();
    if problem.w.domain() != domain {
        return Err(ReconError::shape(
            "admm regularizer domain",
            format!("{domain:?}"),
            &[problem.w.domain().0, problem.w.domain().1],
        ));
    }
    let (batch, channels, m) = problem.y.dim();
    if m != problem.a.codomain_len() {
        return Err(ReconError::shape(
            "admm measurement",
            format!("(B, C, {})", problem.a.codomain_len()),
            problem.y.shape(),
        ));
    }
    if x0.dim() != (batch, channels, domain.0, domain.1) {
        return Err(ReconError::shape(
            "admm x0",
            format!("({batch}, {channels}, {}, {})", domain.0, domain.1),
            x0.shape(),
        ));
    }
    let split_len = problem.w.codomain_len();
    if z0.dim() != (batch, channels, split_len) {
        return Err(ReconError::shape("admm z0", format!("({batch}, {channels}, {split_len})"), z0.shape()));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run(
    y: ArrayView3<'_, f64>,
    a: &dyn LinearOperator,
    w: &dyn LinearOperator,
    x0: ArrayView4<'_, f64>,
    z0: ArrayView3<'_, f64>,
    lam: f64,
    rho: f64,
    strategy: Option<XUpdate>,
    config: &AdmmConfig,
) -> ReconResult<AdmmOutput> {
    config.validate()?;
    let problem = Problem {
        y: y.view(),
        a,
        w,
        lam,
        rho,
    };
    validate(&problem, &x0, &z0)?;

    let strategy = strategy.unwrap_or(if a.supports_tikh() && w.fourier_kernel().is_some() {
        XUpdate::Diagonal
    } else {
        XUpdate::ConjugateGradient
    });
    let (_, channels, rows, cols) = x0.dim();
    let solver = XSolver::build(strategy, &problem, (channels, rows, cols), config.cg)?;
    let threshold = if lam == 0.0 { 0.0 } else { lam / rho };

    let aty = a.adj(y)?;
    let mut x = x0.to_owned();
    let mut z = z0.to_owned();
    let mut u = Array3::zeros(z.raw_dim());
    let mut history = Vec::new();
    let mut status = AdmmStatus::IterationBudgetExhausted;
    let mut iterations = 0;

    for iteration in 1..=config.max_iter {
        iterations = iteration;

        let mut rhs = aty.clone();
        rhs.scaled_add(rho, &w.adj((&z - &u).view())?);
        let (x_next, cg) = solver.solve(&problem, rhs.view(), x.view())?;
        x = x_next;

        let wx = w.dot(x.view())?;
        let z_next = shrink(&(&wx + &u), threshold)?;
        let z_prev = std::mem::replace(&mut z, z_next);

        let report = !config.silent && iteration % config.log_every == 0;
        let lagrangian = if config.record_history || report {
            problem.lagrangian(&x.view(), &wx, &z, &u)?
        } else {
            f64::NAN
        };

        let primal = &wx - &z;
        u += &primal;
        let primal_residual = norm(&primal);
        let dual_residual = rho * norm(&w.adj((&z - &z_prev).view())?);

        if report {
            tracing::info!(
                "admm iteration {}/{}: primal {:.3e}, dual {:.3e}, lagrangian {:.6e}",
                iteration,
                config.max_iter,
                primal_residual,
                dual_residual,
                lagrangian
            );
        }
        if config.record_history {
            history.push(IterateRecord {
                iteration,
                primal_residual,
                dual_residual,
                lagrangian,
                cg,
            });
        }

        if let Some(tol) = config.tol {
            if primal_residual < tol && dual_residual < tol {
                status = AdmmStatus::Converged { iteration };
                break;
            }
        }
    }

    if !config.silent {
        tracing::debug!("admm finished after {} iterations: {:?}", iterations, status);
    }

    Ok(AdmmOutput {
        x: x.clone(),
        state: AdmmState { x, z, u },
        status,
        iterations,
        history,
        x_update: strategy,
    })
}

/// Runs ADMM, choosing the closed-form x-update when both operators allow it.
///
/// # Arguments
/// * `y` - measurements `(B, C, m)` of `a`
/// * `a` - measurement operator
/// * `w` - sparsifying analysis operator on the same domain
/// * `x0`, `z0` - warm start; the scaled dual starts at zero
/// * `lam` - sparsity weight `λ ≥ 0`
/// * `rho` - penalty `ρ > 0`
#[allow(clippy::too_many_arguments)]
pub fn reconstruct(
    y: ArrayView3<'_, f64>,
    a: &dyn LinearOperator,
    w: &dyn LinearOperator,
    x0: ArrayView4<'_, f64>,
    z0: ArrayView3<'_, f64>,
    lam: f64,
    rho: f64,
    config: &AdmmConfig,
) -> ReconResult<AdmmOutput> {
    run(y, a, w, x0, z0, lam, rho, None, config)
}

/// ADMM with the Fourier-diagonal x-update; fails with
/// [`ReconError::Unsupported`] if `a` or `w` cannot provide it.
#[allow(clippy::too_many_arguments)]
pub fn admm_l1_rec_diag(
    y: ArrayView3<'_, f64>,
    a: &dyn LinearOperator,
    w: &dyn LinearOperator,
    x0: ArrayView4<'_, f64>,
    z0: ArrayView3<'_, f64>,
    lam: f64,
    rho: f64,
    config: &AdmmConfig,
) -> ReconResult<AdmmOutput> {
    run(y, a, w, x0, z0, lam, rho, Some(XUpdate::Diagonal), config)
}

/// ADMM with the CG x-update, for any operator pair.
#[allow(clippy::too_many_arguments)]
pub fn admm_l1_rec(
    y: ArrayView3<'_, f64>,
    a: &dyn LinearOperator,
    w: &dyn LinearOperator,
    x0: ArrayView4<'_, f64>,
    z0: ArrayView3<'_, f64>,
    lam: f64,
    rho: f64,
    config: &AdmmConfig,
) -> ReconResult<AdmmOutput> {
    run(y, a, w, x0, z0, lam, rho, Some(XUpdate::ConjugateGradient), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::RadialMask;
    use crate::metrics::{l2_error, ErrorOptions};
    use crate::operators::testing::random_image;
    use crate::operators::{Fourier, Radon, TvAnalysisPeriodic, Wavelet};
    use crate::tensor::to_complex;
    use ndarray::{s, Array4};

    fn quiet(max_iter: usize) -> AdmmConfig {
        AdmmConfig {
            max_iter,
            silent: true,
            record_history: true,
            ..AdmmConfig::default()
        }
    }

    fn blocks(n: usize) -> Array4<f64> {
        let mut x = Array4::zeros((1, 1, n, n));
        x.slice_mut(s![0, 0, n / 4..n / 2, n / 4..3 * n / 4]).fill(1.0);
        x.slice_mut(s![0, 0, n / 2..3 * n / 4, n / 3..n / 2]).fill(0.5);
        x
    }

    fn fourier_problem(n: usize) -> (Fourier, TvAnalysisPeriodic, Array4<f64>, Array3<f64>) {
        let mask = RadialMask::new((n, n), 12, 0).unwrap().into_mask();
        let a = Fourier::new(mask).unwrap();
        let w = TvAnalysisPeriodic::new((n, n));
        let x = to_complex(&blocks(n).view()).unwrap();
        let y = a.dot(x.view()).unwrap();
        (a, w, x, y)
    }

    #[test]
    fn picks_diagonal_update_for_fourier_and_tv() {
        let (a, w, _, y) = fourier_problem(16);
        let x0 = a.adj(y.view()).unwrap();
        let z0 = w.dot(x0.view()).unwrap();
        let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1e-1, &quiet(5)).unwrap();
        assert_eq!(out.x_update, XUpdate::Diagonal);
        assert_eq!(out.iterations, 5);
        assert_eq!(out.history.len(), 5);
        assert_eq!(out.status, AdmmStatus::IterationBudgetExhausted);
        assert!(out.history.iter().all(|r| r.cg.is_none()));
    }

    #[test]
    fn diagonal_and_cg_updates_agree() {
        let (a, w, _, y) = fourier_problem(12);
        let x0 = a.adj(y.view()).unwrap();
        let z0 = w.dot(x0.view()).unwrap();
        let mut config = quiet(10);
        config.cg.rtol = 1e-12;
        let diag = admm_l1_rec_diag(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 0.5, &config).unwrap();
        let cg = admm_l1_rec(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 0.5, &config).unwrap();
        assert_eq!(cg.x_update, XUpdate::ConjugateGradient);
        assert!(cg.history.iter().all(|r| r.cg.is_some()));
        let err = l2_error(cg.x.view(), diag.x.view(), ErrorOptions::relative()).unwrap();
        assert!(err.mean < 1e-6, "relative gap {}", err.mean);
    }

    #[test]
    fn wavelet_regularizer_falls_back_to_cg() {
        let n = 16;
        let a = Radon::new((n, n), crate::operators::radon::uniform_angles(24)).unwrap();
        let w = Wavelet::new((n, n), 2).unwrap();
        let x = blocks(n);
        let y = a.dot(x.view()).unwrap();
        let x0 = Array4::zeros(x.raw_dim());
        let z0 = w.dot(x0.view()).unwrap();
        let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-4, 1.0, &quiet(30)).unwrap();
        assert_eq!(out.x_update, XUpdate::ConjugateGradient);
        let err = l2_error(out.x.view(), x.view(), ErrorOptions::relative()).unwrap();
        assert!(err.mean < 0.5, "relative error {}", err.mean);
    }

    #[test]
    fn forcing_diagonal_without_kernel_is_unsupported() {
        let n = 8;
        let mask = RadialMask::new((n, n), 4, 0).unwrap().into_mask();
        let a = Fourier::new(mask).unwrap();
        let w = Wavelet::new((n, n), 1).unwrap();
        let y = Array3::zeros((1, 2, a.codomain_len()));
        let x0 = Array4::zeros((1, 2, n, n));
        let z0 = Array3::zeros((1, 2, w.codomain_len()));
        let err = admm_l1_rec_diag(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1.0, &quiet(1)).unwrap_err();
        assert!(matches!(err, ReconError::Unsupported { .. }));
    }

    #[test]
    fn tolerance_stops_at_first_satisfying_iteration() {
        let (a, w, _, y) = fourier_problem(16);
        let x0 = a.adj(y.view()).unwrap();
        let z0 = w.dot(x0.view()).unwrap();
        let tol = 5e-3;
        let config = AdmmConfig {
            tol: Some(tol),
            ..quiet(2000)
        };
        let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-4, 1.0, &config).unwrap();
        let iteration = match out.status {
            AdmmStatus::Converged { iteration } => iteration,
            other => panic!("expected convergence, got {other:?}"),
        };
        assert_eq!(iteration, out.iterations);
        assert_eq!(out.history.len(), iteration);
        assert!(iteration < 2000);

        let (last, earlier) = out.history.split_last().unwrap();
        assert_eq!(last.iteration, iteration);
        assert!(last.primal_residual < tol && last.dual_residual < tol);
        // every earlier iterate missed the tolerance on at least one residual
        assert!(earlier
            .iter()
            .all(|r| r.primal_residual >= tol || r.dual_residual >= tol));
    }

    #[test]
    fn zero_lambda_skips_shrinkage() {
        let (a, w, _, y) = fourier_problem(8);
        let x0 = a.adj(y.view()).unwrap();
        let z0 = w.dot(x0.view()).unwrap();
        let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 0.0, 1.0, &quiet(3)).unwrap();
        // without sparsity the zero-filled solution is a fixed point
        let err = l2_error(out.x.view(), x0.view(), ErrorOptions::relative()).unwrap();
        assert!(err.mean < 1e-10);
        assert!(out.x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn invalid_penalties_are_rejected() {
        let (a, w, _, y) = fourier_problem(8);
        let x0 = a.adj(y.view()).unwrap();
        let z0 = w.dot(x0.view()).unwrap();
        for rho in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, rho, &quiet(1)).unwrap_err();
            assert!(matches!(err, ReconError::InvalidParameter { .. }));
        }
        assert!(reconstruct(y.view(), &a, &w, x0.view(), z0.view(), -1e-3, 1.0, &quiet(1)).is_err());
    }

    #[test]
    fn mismatched_warm_start_is_rejected() {
        let (a, w, _, y) = fourier_problem(8);
        let x0 = random_image(0, (1, 1, 8, 8));
        let z0 = Array3::zeros((1, 2, w.codomain_len()));
        let err = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1.0, &quiet(1)).unwrap_err();
        assert!(matches!(err, ReconError::InvalidShape { .. }));
    }

    #[test]
    fn zero_budget_returns_warm_start() {
        let (a, w, _, y) = fourier_problem(8);
        let x0 = a.adj(y.view()).unwrap();
        let z0 = w.dot(x0.view()).unwrap();
        let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1.0, &quiet(0)).unwrap();
        assert_eq!(out.iterations, 0);
        assert_eq!(out.x, x0);
        assert!(out.state.u.iter().all(|&v| v == 0.0));
    }
}
