//! # Tomographic Reconstruction Core
//!
//! Linear measurement operators, a differentiable conjugate-gradient layer and
//! an ADMM engine for sparsity-regularized reconstruction from undersampled
//! measurements.
//!
//! Images are `(B, C, H, W)` batches and measurements `(B, C, m)` batches of
//! `f64`, with `C = 1` for real and `C = 2` for complex (real, imaginary)
//! signals.
//!
//! ## Quick Start
//!
//! ```rust
//! use tomo_recon_core::admm::{reconstruct, AdmmConfig};
//! use tomo_recon_core::data::{random_phantoms, PhantomConfig};
//! use tomo_recon_core::mask::RadialMask;
//! use tomo_recon_core::operators::{Fourier, LinearOperator, TvAnalysisPeriodic};
//! use tomo_recon_core::tensor::to_complex;
//!
//! let x = random_phantoms(1, 32, 42, &PhantomConfig::default()).unwrap();
//! let x = to_complex(&x.view()).unwrap();
//!
//! let a = Fourier::new(RadialMask::new((32, 32), 20, 0).unwrap().into_mask()).unwrap();
//! let w = TvAnalysisPeriodic::new((32, 32));
//! let y = a.dot(x.view()).unwrap();
//!
//! let x0 = a.adj(y.view()).unwrap();
//! let z0 = w.dot(x0.view()).unwrap();
//! let config = AdmmConfig { max_iter: 20, silent: true, ..AdmmConfig::default() };
//! let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-4, 1e-2, &config).unwrap();
//! assert_eq!(out.x.dim(), x.dim());
//! ```
//!
//! ## Core Modules
//!
//! - [`operators`] - Fourier, Radon, wavelet and finite-difference operators
//! - [`solver`] - Batched PCG and the differentiable CG layer
//! - [`admm`] - Scaled ADMM for `½‖Ax − y‖² + λ‖Wx‖₁`
//! - [`grid`] - Hyper-parameter grid search
//! - [`config`] - Experiment configuration via TOML
//! - [`logging`] - JSON line-delimited journal

pub mod admm;
pub mod config;
pub mod data;
pub mod error;
pub mod grid;
pub mod logging;
pub mod mask;
pub mod metrics;
pub mod noise;
pub mod operators;
pub mod prox;
pub mod solver;
pub mod tensor;

pub use admm::{
    admm_l1_rec, admm_l1_rec_diag, reconstruct, AdmmConfig, AdmmOutput, AdmmState, AdmmStatus,
    IterateRecord, XUpdate,
};
pub use config::{ConfigError, ReconConfig};
pub use error::{ReconError, ReconResult};
pub use grid::{grid_search, sweep_noise_levels, GridPoint, GridSearchRecord, GridSearchResult, ParamGrid};
pub use mask::RadialMask;
pub use metrics::{l2_error, l2_error_meas, BatchError, ErrorOptions};
pub use noise::{noise_gaussian, noise_poisson, NoiseKind};
pub use operators::{
    Fourier, FourierMatrix, LinearOperator, Radon, TvAnalysisPeriodic, Wavelet,
};
pub use prox::{proj_l2_ball, shrink, shrink_bands};
pub use solver::{cg_batch, CgConfig, CgDiagnostics, CgInverterLayer};
