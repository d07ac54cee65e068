//! Conjugate-gradient solvers for the normal equations of the reconstruction
//! problem.
//!
//! [`cg`] holds the batched PCG kernel on flattened `(B, N)` systems;
//! [`layer`] wraps it for image-shaped signals and adds the gradient rule.
pub mod cg;
pub mod layer;

pub use cg::{cg_batch, CgConfig, CgDiagnostics, FlatMatMul};
pub use layer::{CgInverterLayer, ImageMatMul, InputGradients, Param, SolveContext};
