//! Differentiable CG inversion of image-shaped systems.
//!
//! [`CgInverterLayer`] solves `A X = B` for batches of `(C, H, W)` images and
//! exposes the implicit-function gradient: for symmetric `A`, the gradient
//! with respect to `B` of any loss is `A⁻¹` applied to the upstream gradient,
//! so `backward` runs the same CG solve on `grad_output`. The initial guess
//! does not influence the solution and receives a zero gradient.

use ndarray::{Array2, Array4, ArrayView2, ArrayView4};

use super::cg::{cg_batch, CgConfig, CgDiagnostics, FlatMatMul};
use crate::error::{ReconError, ReconResult};
use crate::tensor::layout::reshape_owned;

/// Batched product on image-shaped items `(B, C, H, W)`.
pub type ImageMatMul<'a> = Box<dyn Fn(ArrayView4<'_, f64>) -> ReconResult<Array4<f64>> + 'a>;

/// An input of [`CgInverterLayer::forward`] with its gradient flag.
#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub value: ArrayView4<'a, f64>,
    pub requires_grad: bool,
}

impl<'a> Param<'a> {
    pub fn constant(value: ArrayView4<'a, f64>) -> Self {
        Self {
            value,
            requires_grad: false,
        }
    }

    pub fn tracked(value: ArrayView4<'a, f64>) -> Self {
        Self {
            value,
            requires_grad: true,
        }
    }
}

/// State saved by `forward` for the matching `backward` call.
#[derive(Debug, Clone)]
pub struct SolveContext {
    needs_grad_b: bool,
    needs_grad_x0: bool,
    shape: (usize, usize, usize, usize),
    /// Diagnostics of the forward solve.
    pub diagnostics: CgDiagnostics,
}

/// Gradients with respect to the inputs of `forward`; `None` for inputs that
/// did not require one.
#[derive(Debug, Clone, PartialEq)]
pub struct InputGradients {
    pub b: Option<Array4<f64>>,
    pub x0: Option<Array4<f64>>,
}

/// Solves `A X = B` with preconditioned CG for a batch of image-shaped signals.
///
/// `A` must be symmetric positive definite on the flattened signal space.
pub struct CgInverterLayer<'a> {
    /// Item shape `(C, H, W)`.
    shape: (usize, usize, usize),
    a: ImageMatMul<'a>,
    m: Option<ImageMatMul<'a>>,
    config: CgConfig,
}

impl<'a> CgInverterLayer<'a> {
    /// # Arguments
    /// * `shape` - item shape `(C, H, W)` with `C` of 1 (real) or 2 (complex)
    /// * `a` - batched product with the system matrix
    pub fn new(shape: (usize, usize, usize), a: ImageMatMul<'a>) -> Self {
        Self {
            shape,
            a,
            m: None,
            config: CgConfig::default(),
        }
    }

    /// Uses `m` as preconditioner and, without an explicit `x0`, for the initial guess.
    pub fn with_preconditioner(mut self, m: ImageMatMul<'a>) -> Self {
        self.m = Some(m);
        self
    }

    pub fn with_config(mut self, config: CgConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CgConfig {
        &self.config
    }

    pub fn item_shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    fn item_len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    fn check(&self, x: &ArrayView4<f64>, context: &str) -> ReconResult<()> {
        let (_, c, h, w) = x.dim();
        if (c, h, w) != self.shape {
            return Err(ReconError::shape(
                context,
                format!("(B, {}, {}, {})", self.shape.0, self.shape.1, self.shape.2),
                x.shape(),
            ));
        }
        Ok(())
    }

    /// Wraps an image-shaped product as a product on flattened items.
    fn flat<'s>(&'s self, op: &'s ImageMatMul<'a>) -> impl Fn(ArrayView2<'_, f64>) -> ReconResult<Array2<f64>> + 's {
        let (c, h, w) = self.shape;
        let len = self.item_len();
        move |x: ArrayView2<'_, f64>| {
            let batch = x.dim().0;
            let image: Array4<f64> = reshape_owned(&x, (batch, c, h, w))?;
            let out = op(image.view())?;
            reshape_owned(&out, (batch, len))
        }
    }

    fn run(&self, rhs: &ArrayView4<f64>, x0: Option<&ArrayView4<f64>>) -> ReconResult<(Array4<f64>, CgDiagnostics)> {
        let batch = rhs.dim().0;
        let len = self.item_len();
        let b: Array2<f64> = reshape_owned(rhs, (batch, len))?;
        let x0 = match x0 {
            Some(x0) => Some(reshape_owned(x0, (batch, len))?),
            None => None,
        };

        let a = self.flat(&self.a);
        let m = self.m.as_ref().map(|m| self.flat(m));
        let m_ref: Option<&FlatMatMul<'_>> = match &m {
            Some(m) => Some(m),
            None => None,
        };
        let (x, diagnostics) = cg_batch(&a, b.view(), m_ref, x0.as_ref().map(|x| x.view()), &self.config)?;

        let (c, h, w) = self.shape;
        Ok((reshape_owned(&x, (batch, c, h, w))?, diagnostics))
    }

    /// Non-differentiable solve.
    pub fn solve(&self, b: ArrayView4<'_, f64>, x0: Option<ArrayView4<'_, f64>>) -> ReconResult<(Array4<f64>, CgDiagnostics)> {
        self.check(&b, "CgInverterLayer::solve")?;
        if let Some(x0) = &x0 {
            self.check(x0, "CgInverterLayer::solve x0")?;
        }
        self.run(&b, x0.as_ref())
    }

    /// Solves for `X` and records what `backward` needs.
    pub fn forward(&self, b: Param<'_>, x0: Option<Param<'_>>) -> ReconResult<(Array4<f64>, SolveContext)> {
        let (x, diagnostics) = self.solve(b.value, x0.map(|p| p.value))?;
        let ctx = SolveContext {
            needs_grad_b: b.requires_grad,
            needs_grad_x0: x0.map_or(false, |p| p.requires_grad),
            shape: b.value.dim(),
            diagnostics,
        };
        Ok((x, ctx))
    }

    /// Gradients of the inputs given the gradient of the loss with respect to `X`.
    pub fn backward(&self, ctx: &SolveContext, grad_output: ArrayView4<'_, f64>) -> ReconResult<InputGradients> {
        if grad_output.dim() != ctx.shape {
            return Err(ReconError::shape(
                "CgInverterLayer::backward",
                format!("{:?}", ctx.shape),
                grad_output.shape(),
            ));
        }
        let b = if ctx.needs_grad_b {
            Some(self.run(&grad_output, None)?.0)
        } else {
            None
        };
        let x0 = ctx.needs_grad_x0.then(|| Array4::zeros(ctx.shape));
        Ok(InputGradients { b, x0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::testing::random_image;
    use crate::operators::{LinearOperator, TvAnalysisPeriodic};
    use crate::tensor::{inner, norm};

    /// `X ↦ X + 0.5·DᵀD X`, symmetric positive definite.
    fn tv_system(domain: (usize, usize)) -> ImageMatMul<'static> {
        let tv = TvAnalysisPeriodic::new(domain);
        Box::new(move |x| Ok(&x + &(tv.adj(tv.dot(x)?.view())? * 0.5)))
    }

    fn tight() -> CgConfig {
        CgConfig {
            rtol: 1e-12,
            ..CgConfig::default()
        }
    }

    #[test]
    fn solves_image_system() {
        let layer = CgInverterLayer::new((2, 6, 5), tv_system((6, 5))).with_config(tight());
        let truth = random_image(1, (3, 2, 6, 5));
        let b = (layer.a)(truth.view()).unwrap();
        let (x, diag) = layer.solve(b.view(), None).unwrap();
        assert!(diag.converged);
        assert!(norm(&(&x - &truth)) < 1e-8 * norm(&truth));
    }

    #[test]
    fn preconditioner_sets_initial_guess() {
        let layer = CgInverterLayer::new((1, 4, 4), tv_system((4, 4)))
            .with_preconditioner(Box::new(|x| Ok(x.to_owned() * 0.5)))
            .with_config(CgConfig {
                max_iter: Some(0),
                ..CgConfig::default()
            });
        let b = random_image(2, (1, 1, 4, 4));
        let (x, diag) = layer.solve(b.view(), None).unwrap();
        assert_eq!(diag.iterations, 0);
        assert_eq!(x, b.mapv(|v| v * 0.5));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let layer = CgInverterLayer::new((1, 5, 5), tv_system((5, 5))).with_config(tight());
        let b = random_image(3, (2, 1, 5, 5));
        let weights = random_image(4, (2, 1, 5, 5));
        let direction = random_image(5, (2, 1, 5, 5));

        let (_, ctx) = layer.forward(Param::tracked(b.view()), None).unwrap();
        let grads = layer.backward(&ctx, weights.view()).unwrap();
        let grad_b = grads.b.unwrap();
        assert!(grads.x0.is_none());

        let loss = |rhs: &Array4<f64>| inner(&layer.solve(rhs.view(), None).unwrap().0, &weights);
        let eps = 1e-4;
        let plus = &b + &(&direction * eps);
        let minus = &b - &(&direction * eps);
        let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
        let analytic = inner(&grad_b, &direction);
        assert!((numeric - analytic).abs() < 1e-6 * analytic.abs().max(1.0));
    }

    #[test]
    fn untracked_inputs_get_no_gradient() {
        let layer = CgInverterLayer::new((1, 3, 3), tv_system((3, 3)));
        let b = random_image(6, (1, 1, 3, 3));
        let x0 = Array4::zeros((1, 1, 3, 3));
        let (_, ctx) = layer
            .forward(Param::constant(b.view()), Some(Param::tracked(x0.view())))
            .unwrap();
        let grads = layer.backward(&ctx, b.view()).unwrap();
        assert!(grads.b.is_none());
        assert_eq!(grads.x0, Some(Array4::zeros((1, 1, 3, 3))));
    }

    #[test]
    fn rejects_mismatched_item_shape() {
        let layer = CgInverterLayer::new((1, 3, 3), tv_system((3, 3)));
        let b = random_image(7, (1, 2, 3, 3));
        assert!(layer.solve(b.view(), None).is_err());
    }
}
